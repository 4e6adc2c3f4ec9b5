// quarksave Selection Resolver
// Parses user selection expressions ("all", "1-10", "1,3,5", "*.mkv",
// "video", "mkv") and applies them to a traversal's flat file list

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::providers::FileRecord;

// ─── LazyLock regex patterns ────────────────────────────────────────────────

static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*-\s*(\d+)$").expect("RANGE_RE"));

static INDEX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").expect("INDEX_RE"));

const VIDEO_KEYWORDS: &[&str] = &["video", "videos", "movie", "movies", "电影", "影视"];
const ARCHIVE_KEYWORDS: &[&str] = &["archive", "archives", "zip", "rar", "7z", "压缩包", "压缩文件"];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "m4v", "mpg", "mpeg", "webm", "ts", "vob",
];
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z", "tar", "gz", "bz2", "tgz", "xz", "lzma"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Video,
    Archive,
}

impl Category {
    fn from_keyword(keyword: &str) -> Option<Self> {
        let keyword = keyword.to_lowercase();
        if VIDEO_KEYWORDS.contains(&keyword.as_str()) {
            Some(Category::Video)
        } else if ARCHIVE_KEYWORDS.contains(&keyword.as_str()) {
            Some(Category::Archive)
        } else {
            None
        }
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Category::Video => VIDEO_EXTENSIONS,
            Category::Archive => ARCHIVE_EXTENSIONS,
        }
    }
}

/// One element of a position list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Index(u64),
    Range(u64, u64),
}

/// Parsed selection expression
#[derive(Debug, Clone)]
pub enum Selector {
    All,
    /// 1-based inclusive range, clipped to the list
    Range { start: u64, end: u64 },
    /// Union of positions in first-seen order
    Positions(Vec<Position>),
    /// Case-insensitive, fully anchored name pattern
    Glob(Regex),
    Category(Category),
    /// Lowercase extensions without the dot
    Extensions(Vec<String>),
    Nothing,
}

fn parse_range(token: &str) -> Option<(u64, u64)> {
    let caps = RANGE_RE.captures(token)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

fn parse_position(token: &str) -> Option<Position> {
    if INDEX_RE.is_match(token) {
        token.parse().ok().map(Position::Index)
    } else {
        parse_range(token).map(|(s, e)| Position::Range(s, e))
    }
}

fn non_empty_tokens(expr: &str) -> Vec<&str> {
    expr.split(',').map(str::trim).filter(|t| !t.is_empty()).collect()
}

/// `mkv` or `.mkv`: a single optional leading dot and nothing else dotted
fn parse_extension(token: &str) -> Option<String> {
    let bare = token.strip_prefix('.').unwrap_or(token);
    let valid = !bare.is_empty()
        && !bare.contains('.')
        && !bare.contains('*')
        && !bare.chars().any(char::is_whitespace);
    valid.then(|| bare.to_lowercase())
}

fn compile_glob(pattern: &str) -> Option<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("(?is)^{}$", body)).ok()
}

/// Lowercased extension without the dot. Leading dots belong to the stem,
/// so `.bashrc` has no extension.
pub fn file_extension(name: &str) -> Option<String> {
    let stem_start = name.len() - name.trim_start_matches('.').len();
    let rest = &name[stem_start..];
    let dot = rest.rfind('.')?;
    Some(rest[dot + 1..].to_lowercase())
}

impl Selector {
    /// Parse an expression. Cases are tried in priority order and the first
    /// one that matches wins; anything unrecognised selects nothing.
    pub fn parse(expression: &str) -> Self {
        let expr = expression.trim();
        if expr.is_empty() {
            return Selector::Nothing;
        }

        if expr.eq_ignore_ascii_case("all") {
            return Selector::All;
        }

        if let Some((start, end)) = parse_range(expr) {
            return Selector::Range { start, end };
        }

        let tokens = non_empty_tokens(expr);
        if !tokens.is_empty() {
            let positions: Option<Vec<Position>> = tokens.iter().map(|t| parse_position(t)).collect();
            if let Some(positions) = positions {
                return Selector::Positions(positions);
            }
        }

        if expr.contains('*') {
            return compile_glob(expr).map(Selector::Glob).unwrap_or(Selector::Nothing);
        }

        if let Some(category) = Category::from_keyword(expr) {
            return Selector::Category(category);
        }

        if !tokens.is_empty() {
            let extensions: Option<Vec<String>> = tokens.iter().map(|t| parse_extension(t)).collect();
            if let Some(extensions) = extensions {
                return Selector::Extensions(extensions);
            }
        }

        Selector::Nothing
    }

    /// Apply to `files`, keeping input order except for position lists,
    /// which keep the order positions were written in
    pub fn apply<'f>(&self, files: &'f [FileRecord]) -> Vec<&'f FileRecord> {
        let len = files.len() as u64;
        let at = move |pos: u64| &files[(pos - 1) as usize];

        match self {
            Selector::All => files.iter().collect(),
            Selector::Range { start, end } => {
                let first = (*start).max(1);
                let last = (*end).min(len);
                if first > last {
                    return Vec::new();
                }
                (first..=last).map(at).collect()
            }
            Selector::Positions(positions) => {
                let mut seen = HashSet::new();
                let mut picked = Vec::new();
                let mut take = |pos: u64| {
                    if (1..=len).contains(&pos) && seen.insert(pos) {
                        picked.push(at(pos));
                    }
                };
                for position in positions {
                    match *position {
                        Position::Index(i) => take(i),
                        Position::Range(s, e) => {
                            // clip first so huge ranges stay cheap
                            let first = s.max(1);
                            let last = e.min(len);
                            if first <= last {
                                (first..=last).for_each(&mut take);
                            }
                        }
                    }
                }
                picked
            }
            Selector::Glob(re) => files.iter().filter(|f| re.is_match(&f.name)).collect(),
            Selector::Category(category) => {
                let allowed = category.extensions();
                files
                    .iter()
                    .filter(|f| file_extension(&f.name).is_some_and(|e| allowed.contains(&e.as_str())))
                    .collect()
            }
            Selector::Extensions(exts) => files
                .iter()
                .filter(|f| file_extension(&f.name).is_some_and(|e| exts.contains(&e)))
                .collect(),
            Selector::Nothing => Vec::new(),
        }
    }
}

/// Parse `expression` and apply it to `files`. Never fails; an expression
/// that matches nothing (or makes no sense) yields an empty selection.
pub fn resolve<'f>(expression: &str, files: &'f [FileRecord]) -> Vec<&'f FileRecord> {
    Selector::parse(expression).apply(files)
}
