//! Durable JSON-Lines ledger of issues.
//!
//! One issue per line, in insertion order. Appends write a whole line and
//! fsync; `update` rewrites the full record set into a temporary file in the
//! same directory and renames it over the ledger, so a crash leaves either the
//! old ledger or the new one, never a mix.

mod lock;

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;

use crate::error::{GovernanceError, Result};
use crate::issue::{Issue, IssueDraft, IssueId};

pub use lock::{lock_path, LockPolicy};
use lock::{with_lock, LockMode};

/// How new ids are minted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdScheme {
    pub prefix: String,
    pub width: usize,
}

impl Default for IdScheme {
    fn default() -> Self {
        Self {
            prefix: "SC".to_string(),
            width: 3,
        }
    }
}

impl IdScheme {
    /// One past the highest sequence ever written with this prefix.
    ///
    /// Ids are never deleted, so the maximum only grows and no id is reused.
    pub fn next_after<'a, I>(&self, existing: I) -> IssueId
    where
        I: IntoIterator<Item = &'a Issue>,
    {
        let max = existing
            .into_iter()
            .filter_map(|i| i.id.sequence(&self.prefix))
            .max()
            .unwrap_or(0);
        IssueId::format(&self.prefix, max + 1, self.width)
    }
}

/// An owned, ordered, read-only view of the ledger at one point in time.
///
/// Iterating does not touch the file, so it can be walked any number of times.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    issues: Vec<Issue>,
}

impl Snapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, Issue> {
        self.issues.iter()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn get(&self, id: &IssueId) -> Option<&Issue> {
        self.issues.iter().find(|i| &i.id == id)
    }

    pub fn as_slice(&self) -> &[Issue] {
        &self.issues
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Issue;
    type IntoIter = std::slice::Iter<'a, Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.issues.iter()
    }
}

/// Handle on a ledger file. Cheap to construct; every call reads the file afresh.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    ids: IdScheme,
    lock: LockPolicy,
}

impl Ledger {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ids: IdScheme::default(),
            lock: LockPolicy::default(),
        }
    }

    pub fn id_scheme(mut self, ids: IdScheme) -> Self {
        self.ids = ids;
        self
    }

    pub fn lock_policy(mut self, lock: LockPolicy) -> Self {
        self.lock = lock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a fully formed issue. Fails with `DuplicateId` on collision.
    pub fn append(&self, issue: Issue) -> Result<Issue> {
        self.exclusive(|| {
            let existing = self.read_all()?;
            if existing.iter().any(|i| i.id == issue.id) {
                return Err(GovernanceError::DuplicateId(issue.id.clone()));
            }
            self.write_lines(std::slice::from_ref(&issue))?;
            tracing::info!(id = %issue.id, file = %issue.file_path, "issue appended");
            Ok(issue)
        })
    }

    /// Validate a draft, assign the next id under the lock, and append it.
    pub fn append_new(&self, draft: IssueDraft) -> Result<Issue> {
        let mut created = self.append_batch(vec![draft])?;
        Ok(created.remove(0))
    }

    /// Append many drafts under one lock acquisition, assigning consecutive ids.
    ///
    /// Every draft is validated before anything is written.
    pub fn append_batch(&self, drafts: Vec<IssueDraft>) -> Result<Vec<Issue>> {
        self.append_batch_filtered(drafts, |_, _| true)
    }

    /// Like [`Ledger::append_batch`], but `keep` sees the ledger (plus the
    /// records accepted so far in this batch) and may reject a draft.
    ///
    /// The check and the write happen under the same exclusive lock.
    pub fn append_batch_filtered<K>(&self, drafts: Vec<IssueDraft>, mut keep: K) -> Result<Vec<Issue>>
    where
        K: FnMut(&[Issue], &IssueDraft) -> bool,
    {
        for draft in &drafts {
            draft.validate()?;
        }
        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        self.exclusive(|| {
            let mut all = self.read_all()?;
            let start = all.len();
            let now = Utc::now();
            for draft in drafts {
                if !keep(&all, &draft) {
                    continue;
                }
                let id = self.ids.next_after(all.iter());
                all.push(Issue::from_draft(id, draft, now));
            }
            let created = all.split_off(start);
            if created.is_empty() {
                return Ok(created);
            }
            self.write_lines(&created)?;
            for issue in &created {
                tracing::info!(id = %issue.id, file = %issue.file_path, "issue appended");
            }
            Ok(created)
        })
    }

    /// Fetch one issue by id.
    pub fn get(&self, id: &IssueId) -> Result<Issue> {
        let snapshot = self.list_all()?;
        snapshot
            .get(id)
            .cloned()
            .ok_or_else(|| GovernanceError::NotFound(id.clone()))
    }

    /// Apply `mutation` to one record and rewrite the ledger atomically.
    ///
    /// If `mutation` returns an error nothing is written.
    pub fn update<F>(&self, id: &IssueId, mutation: F) -> Result<Issue>
    where
        F: FnOnce(&mut Issue) -> Result<()>,
    {
        self.exclusive(|| {
            let mut issues = self.read_all()?;
            let index = issues
                .iter()
                .position(|i| &i.id == id)
                .ok_or_else(|| GovernanceError::NotFound(id.clone()))?;

            let mut updated = issues[index].clone();
            mutation(&mut updated)?;
            issues[index] = updated.clone();

            self.rewrite(&issues)?;
            tracing::debug!(id = %id, status = %updated.status, "issue updated");
            Ok(updated)
        })
    }

    /// Every record, in write order.
    pub fn list_all(&self) -> Result<Snapshot> {
        with_lock(&self.path, LockMode::Shared, &self.lock, || {
            Ok(Snapshot {
                issues: self.read_all()?,
            })
        })
    }

    fn exclusive<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        with_lock(&self.path, LockMode::Exclusive, &self.lock, f)
    }

    /// Parse the ledger. A missing file is an empty ledger; a bad line is an error.
    fn read_all(&self) -> Result<Vec<Issue>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut issues = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let issue: Issue =
                serde_json::from_str(&line).map_err(|source| GovernanceError::MalformedRecord {
                    path: self.path.clone(),
                    line: idx + 1,
                    source,
                })?;
            issues.push(issue);
        }
        Ok(issues)
    }

    /// Append whole lines in a single write, then fsync.
    fn write_lines(&self, issues: &[Issue]) -> Result<()> {
        self.ensure_parent()?;
        let mut buf = String::new();
        for issue in issues {
            buf.push_str(&encode(issue)?);
            buf.push('\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Write-all-or-nothing replacement of the ledger.
    fn rewrite(&self, issues: &[Issue]) -> Result<()> {
        let dir = self.ensure_parent()?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        for issue in issues {
            writeln!(tmp, "{}", encode(issue)?)?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn ensure_parent(&self) -> Result<PathBuf> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

fn encode(issue: &Issue) -> Result<String> {
    serde_json::to_string(issue).map_err(|e| GovernanceError::Io(io::Error::other(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::{Severity, Status};
    use tempfile::TempDir;

    fn ledger(temp: &TempDir) -> Ledger {
        Ledger::new(temp.path().join("governance").join("issues.jsonl"))
    }

    fn draft(file: &str) -> IssueDraft {
        IssueDraft::new(file, "missing-disclaimer", Severity::Medium, "needs review")
    }

    #[test]
    fn test_missing_file_is_empty_ledger() {
        let temp = TempDir::new().unwrap();
        let snapshot = ledger(&temp).list_all().unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_ids_are_sequential() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        let a = ledger.append_new(draft("a.html")).unwrap();
        let b = ledger.append_new(draft("b.html")).unwrap();
        assert_eq!(a.id.as_str(), "SC-001");
        assert_eq!(b.id.as_str(), "SC-002");
    }

    #[test]
    fn test_ids_continue_after_manual_id() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        let manual = Issue::from_draft(IssueId::from("SC-010"), draft("a.html"), Utc::now());
        ledger.append(manual).unwrap();
        let next = ledger.append_new(draft("b.html")).unwrap();
        assert_eq!(next.id.as_str(), "SC-011");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        let first = ledger.append_new(draft("a.html")).unwrap();
        let copy = Issue::from_draft(first.id.clone(), draft("b.html"), Utc::now());
        let err = ledger.append(copy).unwrap_err();
        assert!(matches!(err, GovernanceError::DuplicateId(_)));
        assert_eq!(ledger.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_round_trip_preserves_order_and_fields() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        let mut written = Vec::new();
        for n in 0..5 {
            let d = draft(&format!("page-{}.html", n))
                .warnings(["funding-amounts"])
                .actions(["add disclaimer", "cite source"])
                .blocking(n % 2 == 0);
            written.push(ledger.append_new(d).unwrap());
        }

        let reloaded = Ledger::new(ledger.path()).list_all().unwrap();
        assert_eq!(reloaded.as_slice(), written.as_slice());
        // Restartable: a second pass sees the same sequence.
        let first: Vec<_> = reloaded.iter().map(|i| i.id.clone()).collect();
        let second: Vec<_> = reloaded.iter().map(|i| i.id.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_update_rewrites_one_record() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        let a = ledger.append_new(draft("a.html")).unwrap();
        ledger.append_new(draft("b.html")).unwrap();

        ledger
            .update(&a.id, |issue| {
                issue.status = Status::InProgress;
                Ok(())
            })
            .unwrap();

        let snapshot = ledger.list_all().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.as_slice()[0].status, Status::InProgress);
        assert_eq!(snapshot.as_slice()[1].status, Status::Pending);
    }

    #[test]
    fn test_failed_mutation_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        let a = ledger.append_new(draft("a.html")).unwrap();
        let before = fs::read_to_string(ledger.path()).unwrap();

        let err = ledger
            .update(&a.id, |issue| {
                issue.status = Status::Resolved;
                Err(GovernanceError::Validation("commit missing".into()))
            })
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(_)));
        assert_eq!(fs::read_to_string(ledger.path()).unwrap(), before);
    }

    #[test]
    fn test_update_unknown_id() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        ledger.append_new(draft("a.html")).unwrap();
        let err = ledger
            .update(&IssueId::from("SC-999"), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, GovernanceError::NotFound(_)));
    }

    #[test]
    fn test_malformed_line_is_surfaced() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        ledger.append_new(draft("a.html")).unwrap();
        let mut file = OpenOptions::new().append(true).open(ledger.path()).unwrap();
        file.write_all(b"{\"id\":\"SC-002\",\"creat").unwrap();

        match ledger.list_all().unwrap_err() {
            GovernanceError::MalformedRecord { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_draft_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        let err = ledger
            .append_batch(vec![draft("a.html"), draft("")])
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(_)));
        assert!(!ledger.path().exists());
    }
}
