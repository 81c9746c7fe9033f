//! Output tree verification
//!
//! Walks the movies and series roots of every account directory that matches
//! the configured patterns and reports pointer folders that a media server
//! would not pick up correctly.

use bridge_traits::error::Result;
use bridge_traits::storage::FileSystemAccess;
use core_library::AccountFilter;
use core_runtime::config::{OutputConfig, ACCOUNT_PLACEHOLDER};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to look for besides pointer files
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    pub sidecars: bool,
    pub poster: bool,
    pub fanart: bool,
    /// Titles and issues printed per category
    pub sample_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueKind {
    MissingPointer,
    InvalidPointer,
    MissingNfo,
    MissingPoster,
    MissingFanart,
    EmptySeason,
    NoSeasons,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::MissingPointer => "folder without .strm",
            IssueKind::InvalidPointer => ".strm without a stream URL",
            IssueKind::MissingNfo => "missing .nfo",
            IssueKind::MissingPoster => "missing poster.jpg",
            IssueKind::MissingFanart => "missing fanart.jpg",
            IssueKind::EmptySeason => "season without episodes",
            IssueKind::NoSeasons => "series without seasons",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub accounts: Vec<String>,
    pub movies: usize,
    pub series: usize,
    pub episodes: usize,
    pub samples: Vec<String>,
    pub issues: Vec<Issue>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    fn flag(&mut self, kind: IssueKind, path: &Path) {
        debug!(path = %path.display(), "{}", kind.as_str());
        self.issues.push(Issue {
            kind,
            path: path.to_path_buf(),
        });
    }
}

/// Human-readable report, one sample block per issue kind
pub struct ReportDisplay<'a> {
    report: &'a VerifyReport,
    sample_size: usize,
}

impl fmt::Display for ReportDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        writeln!(f, "Accounts: {}", report.accounts.join(", "))?;
        writeln!(
            f,
            "Checked {} movies, {} series, {} episodes",
            report.movies, report.series, report.episodes
        )?;
        if !report.samples.is_empty() {
            writeln!(f, "Sample titles:")?;
            for title in &report.samples {
                writeln!(f, "  {}", title)?;
            }
        }

        let kinds: BTreeSet<IssueKind> = report.issues.iter().map(|i| i.kind).collect();
        for kind in kinds {
            writeln!(f, "{}: {}", kind.as_str(), report.count(kind))?;
            for issue in report
                .issues
                .iter()
                .filter(|i| i.kind == kind)
                .take(self.sample_size)
            {
                writeln!(f, "  {}", issue.path.display())?;
            }
        }

        if report.is_clean() {
            write!(f, "No issues found")
        } else {
            write!(f, "{} issue(s) found", report.issues.len())
        }
    }
}

/// Walks an exported tree through the filesystem bridge
pub struct Verifier {
    fs: Arc<dyn FileSystemAccess>,
    output: OutputConfig,
    options: VerifyOptions,
}

impl Verifier {
    pub fn new(fs: Arc<dyn FileSystemAccess>, output: OutputConfig, options: VerifyOptions) -> Self {
        Self {
            fs,
            output,
            options,
        }
    }

    pub fn display<'a>(&self, report: &'a VerifyReport) -> ReportDisplay<'a> {
        ReportDisplay {
            report,
            sample_size: self.options.sample_size,
        }
    }

    /// Verify every account directory that matches `filter`
    pub async fn run(&self, filter: &AccountFilter) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();

        for account in self.discover_accounts(filter).await? {
            info!(account = %account, "Verifying output");
            let movies_root = self.output.movies_root(&account);
            let series_root = self.output.series_root(&account);
            self.verify_movies(&movies_root, &mut report).await?;
            self.verify_series(&series_root, &mut report).await?;
            report.accounts.push(account);
        }

        if report.accounts.is_empty() {
            warn!("No account directories match the configured patterns");
        }
        Ok(report)
    }

    /// Account names found in the directories the templates expand into
    pub async fn discover_accounts(&self, filter: &AccountFilter) -> Result<Vec<String>> {
        let mut found = BTreeSet::new();
        for template in [
            &self.output.movies_dir_template,
            &self.output.series_dir_template,
        ] {
            let Some((parent, prefix, suffix)) = split_template(template) else {
                continue;
            };
            for dir in self.subdirectories(&parent).await? {
                let Some(name) = file_name(&dir) else {
                    continue;
                };
                let account = name
                    .strip_prefix(prefix.as_str())
                    .and_then(|rest| rest.strip_suffix(suffix.as_str()))
                    .filter(|account| !account.is_empty());
                if let Some(account) = account.filter(|a| filter.matches(a)) {
                    found.insert(account.to_string());
                }
            }
        }
        Ok(found.into_iter().collect())
    }

    async fn verify_movies(&self, root: &Path, report: &mut VerifyReport) -> Result<()> {
        for category in self.subdirectories(root).await? {
            for title in self.subdirectories(&category).await? {
                report.movies += 1;
                self.sample(&title, report);

                let pointers = self.pointers(&title).await?;
                if pointers.is_empty() {
                    report.flag(IssueKind::MissingPointer, &title);
                }
                for pointer in &pointers {
                    self.check_pointer(pointer, report).await?;
                }
                self.check_title_sidecars(&title, "movie.nfo", report).await?;
            }
        }
        Ok(())
    }

    async fn verify_series(&self, root: &Path, report: &mut VerifyReport) -> Result<()> {
        for category in self.subdirectories(root).await? {
            for show in self.subdirectories(&category).await? {
                report.series += 1;
                self.sample(&show, report);
                self.check_title_sidecars(&show, "tvshow.nfo", report).await?;

                let seasons: Vec<PathBuf> = self
                    .subdirectories(&show)
                    .await?
                    .into_iter()
                    .filter(|dir| file_name(dir).is_some_and(|n| n.starts_with("Season ")))
                    .collect();
                if seasons.is_empty() {
                    report.flag(IssueKind::NoSeasons, &show);
                }

                for season in seasons {
                    let episodes = self.pointers(&season).await?;
                    if episodes.is_empty() {
                        report.flag(IssueKind::EmptySeason, &season);
                    }
                    for episode in &episodes {
                        report.episodes += 1;
                        self.check_pointer(episode, report).await?;
                        if self.options.sidecars {
                            let nfo = episode.with_extension("nfo");
                            if !self.fs.exists(&nfo).await? {
                                report.flag(IssueKind::MissingNfo, &nfo);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn check_title_sidecars(
        &self,
        dir: &Path,
        nfo_name: &str,
        report: &mut VerifyReport,
    ) -> Result<()> {
        let checks = [
            (self.options.sidecars, nfo_name, IssueKind::MissingNfo),
            (self.options.poster, "poster.jpg", IssueKind::MissingPoster),
            (self.options.fanart, "fanart.jpg", IssueKind::MissingFanart),
        ];
        for (enabled, name, kind) in checks {
            let path = dir.join(name);
            if enabled && !self.fs.exists(&path).await? {
                report.flag(kind, &path);
            }
        }
        Ok(())
    }

    /// The first non-empty line must be an http(s) URL
    async fn check_pointer(&self, pointer: &Path, report: &mut VerifyReport) -> Result<()> {
        let content = self.fs.read_file(pointer).await?;
        let text = String::from_utf8_lossy(&content);
        let valid = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .is_some_and(|line| {
                let lower = line.to_ascii_lowercase();
                lower.starts_with("http://") || lower.starts_with("https://")
            });
        if !valid {
            report.flag(IssueKind::InvalidPointer, pointer);
        }
        Ok(())
    }

    fn sample(&self, dir: &Path, report: &mut VerifyReport) {
        if report.samples.len() < self.options.sample_size {
            if let Some(name) = file_name(dir) {
                report.samples.push(name.to_string());
            }
        }
    }

    /// Sorted `.strm` files directly inside `dir`
    async fn pointers(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut pointers = Vec::new();
        for entry in self.fs.list_directory(dir).await? {
            let is_pointer = entry
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("strm"));
            if is_pointer && !self.fs.metadata(&entry).await?.is_directory {
                pointers.push(entry);
            }
        }
        pointers.sort();
        Ok(pointers)
    }

    /// Sorted subdirectories; a missing directory has none
    async fn subdirectories(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !self.fs.exists(dir).await? {
            return Ok(Vec::new());
        }
        let mut dirs = Vec::new();
        for entry in self.fs.list_directory(dir).await? {
            if self.fs.metadata(&entry).await?.is_directory {
                dirs.push(entry);
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Directory holding the account folders, plus the text around the
/// placeholder inside the account folder name
fn split_template(template: &str) -> Option<(PathBuf, String, String)> {
    let (head, tail) = template.split_once(ACCOUNT_PLACEHOLDER)?;
    let (parent, prefix) = match head.rfind('/') {
        Some(idx) => (&head[..idx.max(1)], &head[idx + 1..]),
        None => (".", head),
    };
    let suffix = tail.split('/').next().unwrap_or_default();
    Some((PathBuf::from(parent), prefix.to_string(), suffix.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::TokioFileSystem;
    use core_runtime::ExportConfig;
    use std::fs;
    use tempfile::TempDir;

    fn output(root: &Path) -> OutputConfig {
        ExportConfig::builder()
            .api_password("secret")
            .movies_dir_template(format!("{}/{{XC_NAME}}/Movies", root.display()))
            .series_dir_template(format!("{}/{{XC_NAME}}/Series", root.display()))
            .build()
            .unwrap()
            .output
    }

    fn verifier(root: &Path, options: VerifyOptions) -> Verifier {
        Verifier::new(Arc::new(TokioFileSystem::new()), output(root), options)
    }

    fn write(path: PathBuf, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_split_template() {
        let (parent, prefix, suffix) = split_template("/mnt/vod/{XC_NAME}/Movies").unwrap();
        assert_eq!(parent, PathBuf::from("/mnt/vod"));
        assert_eq!((prefix.as_str(), suffix.as_str()), ("", ""));

        let (parent, prefix, suffix) = split_template("/mnt/VOD-{XC_NAME}-m/Movies").unwrap();
        assert_eq!(parent, PathBuf::from("/mnt"));
        assert_eq!((prefix.as_str(), suffix.as_str()), ("VOD-", "-m"));

        assert!(split_template("/mnt/vod/Movies").is_none());
    }

    #[tokio::test]
    async fn test_clean_tree() {
        let tmp = TempDir::new().unwrap();
        let movie = tmp.path().join("Demo/Movies/Sci-Fi/Inception (2010)");
        write(movie.join("Inception (2010).strm"), "http://host/proxy/vod/movie/u1\n");
        write(movie.join("movie.nfo"), "<movie/>");
        let show = tmp.path().join("Demo/Series/Drama/Dark (2017)");
        write(show.join("tvshow.nfo"), "<tvshow/>");
        write(
            show.join("Season 01/S01E01 - Secrets.strm"),
            "\nhttps://host/proxy/vod/episode/e1\n",
        );
        write(show.join("Season 01/S01E01 - Secrets.nfo"), "<episodedetails/>");

        let verifier = verifier(
            tmp.path(),
            VerifyOptions {
                sidecars: true,
                sample_size: 5,
                ..VerifyOptions::default()
            },
        );
        let report = verifier
            .run(&AccountFilter::parse("%").unwrap())
            .await
            .unwrap();

        assert_eq!(report.accounts, vec!["Demo".to_string()]);
        assert_eq!((report.movies, report.series, report.episodes), (1, 1, 1));
        assert!(report.is_clean(), "{:?}", report.issues);
        assert_eq!(report.samples, vec!["Inception (2010)", "Dark (2017)"]);
        assert!(verifier
            .display(&report)
            .to_string()
            .ends_with("No issues found"));
    }

    #[tokio::test]
    async fn test_reports_broken_entries() {
        let tmp = TempDir::new().unwrap();
        let movies = tmp.path().join("Demo/Movies/Action");
        fs::create_dir_all(movies.join("Empty (2001)")).unwrap();
        write(movies.join("Heat (1995)/Heat (1995).strm"), "not a url");
        let series = tmp.path().join("Demo/Series/Drama");
        fs::create_dir_all(series.join("Dark (2017)/Season 01")).unwrap();
        fs::create_dir_all(series.join("Lost (2004)")).unwrap();

        let report = verifier(
            tmp.path(),
            VerifyOptions {
                poster: true,
                sample_size: 3,
                ..VerifyOptions::default()
            },
        )
        .run(&AccountFilter::parse("*").unwrap())
        .await
        .unwrap();

        assert_eq!(report.count(IssueKind::MissingPointer), 1);
        assert_eq!(report.count(IssueKind::InvalidPointer), 1);
        assert_eq!(report.count(IssueKind::EmptySeason), 1);
        assert_eq!(report.count(IssueKind::NoSeasons), 1);
        assert_eq!(report.count(IssueKind::MissingPoster), 4);
        assert_eq!(report.count(IssueKind::MissingNfo), 0);
    }

    #[tokio::test]
    async fn test_only_matching_accounts_are_checked() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("Demo/Movies")).unwrap();
        fs::create_dir_all(tmp.path().join("Other/Series")).unwrap();

        let accounts = verifier(tmp.path(), VerifyOptions::default())
            .discover_accounts(&AccountFilter::parse("De%").unwrap())
            .await
            .unwrap();

        assert_eq!(accounts, vec!["Demo".to_string()]);
    }
}
