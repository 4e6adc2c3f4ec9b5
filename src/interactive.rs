// quarksave Interactive Session
// Line-based prompts for picking share files and a destination directory

use serde::Serialize;
use std::io::{self, BufRead, Write};
use thiserror::Error;
use tracing::debug;

use crate::directory::{join_path, split_path, DirectoryIndex, DirectoryResolver};
use crate::providers::{FileRecord, ProviderError, ROOT_DIR_ID};
use crate::render::{format_size, render_directory_index};
use crate::selection::resolve;
use crate::transfer::{TransferOutcome, TransferReport};

pub const SELECTION_HELP: &str = "\
Selection syntax:
  all            every file
  1-10           positions 1 to 10
  1,3,5          listed positions (ranges allowed: 1-3,7)
  *.mkv          name glob, * matches anything
  video          category: video, audio, image, document, zip
  mkv  mkv,pdf   extensions
";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Input error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// `y`, `yes` or `是`, any case
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "是")
}

/// What the user typed at the destination prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetChoice {
    /// Drive root
    Home,
    /// Create a directory with this name under a parent asked for next
    New(String),
    /// Existing (or to-be-created) path
    Path(String),
}

impl TargetChoice {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        if input.eq_ignore_ascii_case("home") {
            return Some(TargetChoice::Home);
        }
        if let Some(name) = input.strip_prefix("new:") {
            let name = name.trim();
            return (!name.is_empty()).then(|| TargetChoice::New(name.to_string()));
        }
        Some(TargetChoice::Path(input.to_string()))
    }
}

/// Chosen save destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub path: String,
    pub id: String,
}

impl Destination {
    pub fn root() -> Self {
        Self {
            path: "/".to_string(),
            id: ROOT_DIR_ID.to_string(),
        }
    }
}

fn normalize(path: &str) -> String {
    format!("/{}", split_path(path).join("/"))
}

/// Result line printed when an interactive save ends
#[derive(Debug, Clone, Serialize)]
pub struct SaveSummary {
    pub action: &'static str,
    pub status: &'static str,
    pub task_id: String,
    pub file_count: usize,
    pub target_dir: String,
    pub target_fid: String,
    pub outcome: TransferOutcome,
}

impl SaveSummary {
    pub fn new(report: &TransferReport, file_count: usize, destination: &Destination) -> Self {
        Self {
            action: "save",
            status: if report.outcome.is_success() { "success" } else { "error" },
            task_id: report.job_id.clone(),
            file_count,
            target_dir: destination.path.clone(),
            target_fid: destination.id.clone(),
            outcome: report.outcome.clone(),
        }
    }
}

/// Prompt/answer pair over any line reader and writer. End of input reads as
/// `None` and callers treat it as the user giving up.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn say(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes())?;
        self.output.flush()
    }

    pub fn ask(&mut self, message: &str) -> io::Result<Option<String>> {
        self.say(message)?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

/// Ask for a selection expression until one matches and is confirmed
pub fn choose_files<'f, R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    files: &'f [FileRecord],
) -> Result<Option<Vec<&'f FileRecord>>, PromptError> {
    loop {
        let Some(expression) = console.ask("Select files (help for syntax): ")? else {
            return Ok(None);
        };
        if expression.is_empty() {
            continue;
        }
        if expression.eq_ignore_ascii_case("help") {
            console.say(SELECTION_HELP)?;
            continue;
        }

        let picked = resolve(&expression, files);
        if picked.is_empty() {
            console.say(&format!("No files matched '{}'\n", expression))?;
            continue;
        }
        debug!("'{}' selected {} files", expression, picked.len());

        let mut listing = String::new();
        for (i, file) in picked.iter().enumerate() {
            listing.push_str(&format!("  [{}] {} ({})\n", i + 1, file.name, format_size(file.size_bytes)));
        }
        let total: u64 = picked.iter().map(|f| f.size_bytes).sum();
        listing.push_str(&format!("{} files, {}\n", picked.len(), format_size(total)));
        console.say(&listing)?;

        let Some(answer) = console.ask("Save these files? [y/N]: ")? else {
            return Ok(None);
        };
        if is_yes(&answer) {
            return Ok(Some(picked));
        }
    }
}

/// Show the caller's directories and ask where to save. Accepts an existing
/// path, `home`, or `new:<name>`; a missing path may be created on request.
pub async fn choose_destination<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    resolver: &DirectoryResolver<'_>,
) -> Result<Option<Destination>, PromptError> {
    let index = DirectoryIndex::new(resolver.build_index().await?);
    console.say(&render_directory_index(index.entries()))?;

    loop {
        let Some(input) = console.ask("Destination (/path, home, new:<name>): ")? else {
            return Ok(None);
        };
        let Some(choice) = TargetChoice::parse(&input) else {
            continue;
        };

        match choice {
            TargetChoice::Home => return Ok(Some(Destination::root())),
            TargetChoice::New(name) => {
                let Some(parent) = console.ask(&format!("Create '{}' under (empty for /): ", name))? else {
                    return Ok(None);
                };
                let parent_path = normalize(&parent);
                let Some(parent_id) = index.lookup(&parent_path) else {
                    console.say(&format!("No directory {}\n", parent_path))?;
                    continue;
                };
                match resolver.create_directory(&name, parent_id).await {
                    Ok(id) => {
                        let path = join_path(&parent_path, &name);
                        console.say(&format!("Created {}\n", path))?;
                        return Ok(Some(Destination { path, id }));
                    }
                    Err(e) if e.domain_kind().is_some() || matches!(e, ProviderError::InvalidConfig(_)) => {
                        console.say(&format!("{}\n", e))?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            TargetChoice::Path(path) => {
                let path = normalize(&path);
                if let Some(id) = index.lookup(&path) {
                    return Ok(Some(Destination {
                        path,
                        id: id.to_string(),
                    }));
                }
                let Some(answer) = console.ask(&format!("{} does not exist. Create it? [y/N]: ", path))? else {
                    return Ok(None);
                };
                if is_yes(&answer) {
                    let id = resolver.ensure_path(&path).await?;
                    return Ok(Some(Destination { path, id }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::providers::endpoints::{FILE, FILE_SORT};
    use crate::providers::testing::{listing, ScriptedTransport};
    use crate::providers::{QuarkClient, TransferStatus};
    use serde_json::{json, Value};
    use std::io::Cursor;
    use std::sync::Arc;

    fn console(input: &str) -> Console<Cursor<Vec<u8>>, Vec<u8>> {
        Console::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn printed(console: &Console<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8_lossy(&console.output).into_owned()
    }

    fn folder(fid: &str, name: &str) -> Value {
        json!({"fid": fid, "file_name": name, "type": "folder", "dir": true})
    }

    // /Movies{ /2024 }, /Docs
    fn drive() -> ScriptedTransport {
        ScriptedTransport::new()
            .on(FILE_SORT, &[("pdir_fid", "0")], listing(vec![folder("m", "Movies"), folder("d", "Docs")]))
            .on(FILE_SORT, &[("pdir_fid", "m")], listing(vec![folder("m24", "2024")]))
            .on(FILE_SORT, &[("pdir_fid", "m24")], listing(vec![]))
            .on(FILE_SORT, &[("pdir_fid", "d")], listing(vec![]))
    }

    fn make_client(transport: Arc<ScriptedTransport>) -> QuarkClient {
        QuarkClient::new(transport, ClientConfig::default())
    }

    fn created(t: &ScriptedTransport) -> Vec<(String, String)> {
        t.requests()
            .iter()
            .filter(|r| r.endpoint == FILE)
            .filter_map(|r| r.body.clone())
            .map(|b| (b["pdir_fid"].as_str().unwrap().to_string(), b["file_name"].as_str().unwrap().to_string()))
            .collect()
    }

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES "));
        assert!(is_yes("是"));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("yeah"));
    }

    #[test]
    fn test_target_choice_parse() {
        assert_eq!(TargetChoice::parse(" home "), Some(TargetChoice::Home));
        assert_eq!(TargetChoice::parse("HOME"), Some(TargetChoice::Home));
        assert_eq!(TargetChoice::parse("new: Shows "), Some(TargetChoice::New("Shows".into())));
        assert_eq!(TargetChoice::parse("new:"), None);
        assert_eq!(TargetChoice::parse("/Movies/2024"), Some(TargetChoice::Path("/Movies/2024".into())));
        assert_eq!(TargetChoice::parse("  "), None);
    }

    #[test]
    fn test_choose_files_retries_until_confirmed() {
        let files = vec![
            FileRecord::file("a", "a.mkv", 1024, "0"),
            FileRecord::file("b", "b.mkv", 2048, "0"),
            FileRecord::file("c", "c.pdf", 10, "0"),
        ];
        let mut console = console("\nhelp\n*.zip\n*.mkv\nn\n2\ny\n");
        let picked = choose_files(&mut console, &files).unwrap().unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "b");

        let out = printed(&console);
        assert!(out.contains("Selection syntax"));
        assert!(out.contains("No files matched '*.zip'"));
        assert!(out.contains("  [2] b.mkv (2.00 KB)"));
        assert!(out.contains("2 files, 3.00 KB"));
    }

    #[test]
    fn test_choose_files_end_of_input_cancels() {
        let files = vec![FileRecord::file("a", "a.mkv", 1, "0")];
        assert!(choose_files(&mut console(""), &files).unwrap().is_none());
        assert!(choose_files(&mut console("all\n"), &files).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_destination_existing_path_and_home() {
        let t = Arc::new(drive());
        let client = make_client(t.clone());
        let resolver = DirectoryResolver::new(&client);

        let mut con = console("\nMovies/2024/\n");
        let dest = choose_destination(&mut con, &resolver).await.unwrap().unwrap();
        assert_eq!(dest, Destination { path: "/Movies/2024".into(), id: "m24".into() });
        assert!(printed(&con).contains("/Movies/2024"));

        let dest = choose_destination(&mut console("home\n"), &resolver).await.unwrap().unwrap();
        assert_eq!(dest, Destination::root());
        assert!(created(&t).is_empty());
    }

    #[tokio::test]
    async fn test_destination_new_under_parent() {
        let t = Arc::new(drive().on(FILE, &[], json!({"status": 200, "data": {"fid": "n1"}})));
        let client = make_client(t.clone());
        let resolver = DirectoryResolver::new(&client);

        let mut con = console("new:Shows\n/Nope\nnew:Shows\n/Movies\n");
        let dest = choose_destination(&mut con, &resolver).await.unwrap().unwrap();
        assert_eq!(dest, Destination { path: "/Movies/Shows".into(), id: "n1".into() });
        assert!(printed(&con).contains("No directory /Nope"));
        assert_eq!(created(&t), vec![("m".to_string(), "Shows".to_string())]);

        let dest = choose_destination(&mut console("new:Top\n\n"), &resolver).await.unwrap().unwrap();
        assert_eq!(dest.path, "/Top");
        assert_eq!(created(&t)[1], ("0".to_string(), "Top".to_string()));
    }

    #[tokio::test]
    async fn test_destination_collision_reprompts() {
        let t = Arc::new(drive().on(FILE, &[], json!({"status": 400, "message": "同名文件夹已存在"})));
        let client = make_client(t);
        let mut con = console("new:Docs\n/\nhome\n");
        let dest = choose_destination(&mut con, &DirectoryResolver::new(&client))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dest, Destination::root());
    }

    #[tokio::test]
    async fn test_destination_offers_to_create_missing_path() {
        let t = Arc::new(drive().on(FILE, &[], json!({"status": 200, "data": {"fid": "x1"}})));
        let client = make_client(t.clone());
        let resolver = DirectoryResolver::new(&client);

        let mut con = console("/Docs/X\nn\n/Docs/X\ny\n");
        let dest = choose_destination(&mut con, &resolver).await.unwrap().unwrap();
        assert_eq!(dest, Destination { path: "/Docs/X".into(), id: "x1".into() });
        assert!(printed(&con).contains("/Docs/X does not exist"));
        assert_eq!(created(&t), vec![("d".to_string(), "X".to_string())]);

        assert!(choose_destination(&mut console("/Docs/Y\n"), &resolver).await.unwrap().is_none());
    }

    #[test]
    fn test_save_summary() {
        let report = TransferReport {
            job_id: "j1".into(),
            final_status: Some(TransferStatus::Completed),
            outcome: TransferOutcome::Completed,
            polls: 2,
        };
        let summary = SaveSummary::new(&report, 3, &Destination { path: "/Movies".into(), id: "m".into() });
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["action"], "save");
        assert_eq!(json["status"], "success");
        assert_eq!(json["task_id"], "j1");
        assert_eq!(json["file_count"], 3);
        assert_eq!(json["target_dir"], "/Movies");
        assert_eq!(json["target_fid"], "m");
        assert_eq!(json["outcome"]["kind"], "completed");

        let failed = TransferReport { outcome: TransferOutcome::TimedOut, ..report };
        assert_eq!(SaveSummary::new(&failed, 1, &Destination::root()).status, "error");
    }
}
