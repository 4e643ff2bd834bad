//! In-memory SMB share tree.
//!
//! [`MemoryClient`] implements [`SmbClient`] over a process-local tree of
//! servers, shares, directories and files. All data is lost when the last clone
//! is dropped. Used by the test suite and by downstream code that needs a fake
//! share.
//!
//! Entries are keyed by `host/share/path...` (no scheme, no leading or
//! trailing `/`). Keys are case-sensitive.
//!
//! Beyond plain storage the client supports:
//!
//! - per-operation fault injection ([`MemoryClient::fail_on`]),
//! - a required username per share ([`MemoryClient::require_user`]),
//! - counters for resolves, renames and open directory cursors
//!   ([`MemoryClient::stats`]).

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque, btree_map};
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use parking_lot::RwLock;
use percent_encoding::percent_decode_str;
use url::Url;

use super::{DirCursor, RemoteHandle, RemoteKind, SmbClient};
use crate::attributes::NativeAttributes;
use crate::context::AuthContext;
use crate::error::SmbError;

/// Remote operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Resolve,
    /// Every read-only probe: existence, kind, attributes, times, length.
    Query,
    SetAttributes,
    SetLastModified,
    /// Opening a directory cursor.
    List,
    /// Advancing an open directory cursor.
    ListEntry,
    OpenInput,
    OpenOutput,
    /// Writing to an open output stream.
    Write,
    Delete,
    Mkdir,
    Rename,
}

/// Snapshot of the client counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Calls to [`SmbClient::resolve`].
    pub resolves: usize,
    /// Calls to [`RemoteHandle::rename_to`].
    pub renames: usize,
    /// Directory cursors opened and not yet dropped.
    pub open_cursors: usize,
}

#[derive(Debug, Clone)]
enum EntryKind {
    Server,
    Share,
    Directory,
    File(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Entry {
    kind: EntryKind,
    /// Stored attribute bits, without `DIRECTORY`.
    attributes: u32,
    modified: SystemTime,
}

impl Entry {
    fn new(kind: EntryKind) -> Self {
        Self {
            kind,
            attributes: 0,
            modified: SystemTime::now(),
        }
    }

    fn for_depth(depth: usize) -> Self {
        match depth {
            1 => Self::new(EntryKind::Server),
            2 => Self::new(EntryKind::Share),
            _ => Self::new(EntryKind::Directory),
        }
    }

    fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File(_))
    }

    fn is_container(&self) -> bool {
        !self.is_file()
    }

    fn attribute_bits(&self) -> u32 {
        if self.is_container() {
            self.attributes | NativeAttributes::DIRECTORY.bits()
        } else {
            self.attributes
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, Entry>,
    faults: HashSet<Operation>,
    /// share key -> username every caller must authenticate as
    required_users: HashMap<String, String>,
}

impl MemoryState {
    fn check(&self, operation: Operation, key: &str) -> Result<(), SmbError> {
        if self.faults.contains(&operation) {
            return Err(SmbError::Transport(format!(
                "injected {operation:?} failure for '{key}'"
            )));
        }
        Ok(())
    }

    fn entry(&self, key: &str) -> Result<&Entry, SmbError> {
        self.entries
            .get(key)
            .ok_or_else(|| SmbError::NotFound(key.to_string()))
    }

    fn entry_mut(&mut self, key: &str) -> Result<&mut Entry, SmbError> {
        self.entries
            .get_mut(key)
            .ok_or_else(|| SmbError::NotFound(key.to_string()))
    }

    /// Parent key of a key with depth >= 3 must name an existing container.
    fn check_parent(&self, key: &str) -> Result<(), SmbError> {
        let parent = parent_key(key);
        match self.entries.get(parent) {
            Some(entry) if entry.is_container() => Ok(()),
            Some(_) => Err(SmbError::NotADirectory(parent.to_string())),
            None => Err(SmbError::NotFound(parent.to_string())),
        }
    }

    fn insert_with_ancestors(&mut self, key: &str, leaf: Entry) {
        let mut depth = 0;
        for (index, _) in key.match_indices('/') {
            depth += 1;
            self.entries
                .entry(key[..index].to_string())
                .or_insert_with(|| Entry::for_depth(depth));
        }
        self.entries.insert(key.to_string(), leaf);
    }

    fn remove_subtree(&mut self, key: &str) {
        let prefix = format!("{key}/");
        self.entries.retain(|k, _| k != key && !k.starts_with(&prefix));
    }

    fn child_keys(&self, key: &str) -> Vec<String> {
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{key}/")
        };
        self.entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| !k.is_empty() && !k[prefix.len()..].contains('/'))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[derive(Debug, Default)]
struct Counters {
    resolves: AtomicUsize,
    renames: AtomicUsize,
    open_cursors: AtomicUsize,
}

/// Thread-safe in-memory share tree implementing [`SmbClient`].
///
/// Cloning is cheap and every clone shares the same tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryClient {
    state: Arc<RwLock<MemoryState>>,
    counters: Arc<Counters>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `host` and `host/share`.
    pub fn add_share(&self, host: &str, share: &str) {
        let key = normalize_key(&format!("{host}/{share}"));
        let mut state = self.state.write();
        if !state.entries.contains_key(&key) {
            state.insert_with_ancestors(&key, Entry::for_depth(2));
        }
    }

    /// Create or replace a file, creating missing ancestors.
    pub fn put_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        let key = normalize_key(path);
        self.state
            .write()
            .insert_with_ancestors(&key, Entry::new(EntryKind::File(data.into())));
    }

    /// Create a directory and any missing ancestors.
    pub fn mkdir_all(&self, path: &str) {
        let key = normalize_key(path);
        let depth = key_depth(&key);
        let mut state = self.state.write();
        if !state.entries.contains_key(&key) {
            state.insert_with_ancestors(&key, Entry::for_depth(depth));
        }
    }

    /// Contents of the file at `path`, if it is a file.
    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        match &self.state.read().entries.get(&normalize_key(path))?.kind {
            EntryKind::File(data) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state
            .read()
            .entries
            .contains_key(&normalize_key(path))
    }

    /// Raw attribute bits of the entry at `path`.
    pub fn attributes_of(&self, path: &str) -> Option<u32> {
        self.state
            .read()
            .entries
            .get(&normalize_key(path))
            .map(Entry::attribute_bits)
    }

    /// Make every subsequent `operation` fail with a transport error.
    pub fn fail_on(&self, operation: Operation) {
        self.state.write().faults.insert(operation);
    }

    pub fn clear_faults(&self) {
        self.state.write().faults.clear();
    }

    /// Deny access to `host/share` for every caller not authenticated as `username`.
    pub fn require_user(&self, host: &str, share: &str, username: &str) {
        self.state.write().required_users.insert(
            normalize_key(&format!("{host}/{share}")),
            username.to_string(),
        );
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            resolves: self.counters.resolves.load(Ordering::SeqCst),
            renames: self.counters.renames.load(Ordering::SeqCst),
            open_cursors: self.counters.open_cursors.load(Ordering::SeqCst),
        }
    }

    fn handle(&self, scheme: &str, key: String, directory: bool, username: Option<&str>) -> MemoryHandle {
        let authorized = {
            let state = self.state.read();
            share_key(&key)
                .and_then(|share| state.required_users.get(share))
                .is_none_or(|required| username == Some(required.as_str()))
        };
        let mut url = format!("{scheme}://{key}");
        if directory && !url.ends_with('/') {
            url.push('/');
        }
        MemoryHandle {
            client: self.clone(),
            scheme: scheme.to_string(),
            url,
            key,
            username: username.map(str::to_string),
            authorized,
        }
    }
}

impl SmbClient for MemoryClient {
    fn resolve(&self, url: &Url, context: &AuthContext) -> Result<Arc<dyn RemoteHandle>, SmbError> {
        self.counters.resolves.fetch_add(1, Ordering::SeqCst);
        let host = url.host_str().unwrap_or_default();
        let path = percent_decode_str(url.path())
            .decode_utf8()
            .map_err(|_| SmbError::InvalidPath(url.to_string()))?;
        let key = normalize_key(&format!("{host}{path}"));
        self.state.read().check(Operation::Resolve, &key)?;
        if key.split('/').any(|segment| segment == "." || segment == "..") {
            return Err(SmbError::InvalidPath(url.to_string()));
        }

        let directory = path.ends_with('/') || key_depth(&key) <= 2;
        Ok(Arc::new(self.handle(
            url.scheme(),
            key,
            directory,
            context.username(),
        )))
    }
}

/// Handle bound to one key of a [`MemoryClient`].
#[derive(Debug)]
struct MemoryHandle {
    client: MemoryClient,
    scheme: String,
    url: String,
    key: String,
    username: Option<String>,
    authorized: bool,
}

impl MemoryHandle {
    fn check(&self, operation: Operation) -> Result<(), SmbError> {
        self.client.state.read().check(operation, &self.key)?;
        if !self.authorized {
            return Err(SmbError::AccessDenied(self.key.clone()));
        }
        Ok(())
    }

    fn depth(&self) -> usize {
        key_depth(&self.key)
    }

    fn require_in_share(&self) -> Result<(), SmbError> {
        if self.depth() < 3 {
            return Err(SmbError::AccessDenied(format!(
                "invalid operation for workgroups, servers, or shares: '{}'",
                self.key
            )));
        }
        Ok(())
    }

    fn query<T>(&self, f: impl FnOnce(&Entry) -> T) -> Result<T, SmbError> {
        self.check(Operation::Query)?;
        let state = self.client.state.read();
        state.entry(&self.key).map(f)
    }

    fn exists_unchecked(&self) -> bool {
        self.key.is_empty() || self.client.state.read().entries.contains_key(&self.key)
    }
}

impl RemoteHandle for MemoryHandle {
    fn url(&self) -> &str {
        &self.url
    }

    fn name(&self) -> String {
        let name = self.key.rsplit('/').next().unwrap_or_default();
        if self.url.ends_with('/') && !name.is_empty() {
            format!("{name}/")
        } else {
            name.to_string()
        }
    }

    fn kind(&self) -> Result<RemoteKind, SmbError> {
        Ok(match self.depth() {
            0 => RemoteKind::Workgroup,
            1 => RemoteKind::Server,
            2 => RemoteKind::Share,
            _ => RemoteKind::Filesystem,
        })
    }

    fn exists(&self) -> Result<bool, SmbError> {
        self.check(Operation::Query)?;
        Ok(self.exists_unchecked())
    }

    fn is_directory(&self) -> Result<bool, SmbError> {
        if self.key.is_empty() {
            return Ok(true);
        }
        match self.query(Entry::is_container) {
            Err(SmbError::NotFound(_)) => Ok(false),
            other => other,
        }
    }

    fn is_file(&self) -> Result<bool, SmbError> {
        match self.query(Entry::is_file) {
            Err(SmbError::NotFound(_)) => Ok(false),
            other => other,
        }
    }

    fn can_read(&self) -> Result<bool, SmbError> {
        self.exists()
    }

    fn can_write(&self) -> Result<bool, SmbError> {
        if self.depth() < 3 {
            self.check(Operation::Query)?;
            return Ok(false);
        }
        match self.query(|entry| entry.attributes & NativeAttributes::READONLY.bits() == 0) {
            Err(SmbError::NotFound(_)) => Ok(false),
            other => other,
        }
    }

    fn attributes(&self) -> Result<u32, SmbError> {
        self.query(Entry::attribute_bits)
    }

    fn set_attributes(&self, bits: u32) -> Result<(), SmbError> {
        self.check(Operation::SetAttributes)?;
        self.require_in_share()?;
        let mut state = self.client.state.write();
        let entry = state.entry_mut(&self.key)?;
        entry.attributes = bits & !NativeAttributes::DIRECTORY.bits();
        Ok(())
    }

    fn last_modified(&self) -> Result<SystemTime, SmbError> {
        self.query(|entry| entry.modified)
    }

    fn set_last_modified(&self, time: SystemTime) -> Result<(), SmbError> {
        self.check(Operation::SetLastModified)?;
        self.require_in_share()?;
        self.client.state.write().entry_mut(&self.key)?.modified = time;
        Ok(())
    }

    fn length(&self) -> Result<u64, SmbError> {
        self.query(|entry| match &entry.kind {
            EntryKind::File(data) => data.len() as u64,
            _ => 0,
        })
    }

    fn children(&self) -> Result<Box<dyn DirCursor>, SmbError> {
        self.check(Operation::List)?;
        let state = self.client.state.read();
        if !self.key.is_empty() {
            let entry = state.entry(&self.key)?;
            if entry.is_file() {
                return Err(SmbError::NotADirectory(self.key.clone()));
            }
        }
        let pending = state
            .child_keys(&self.key)
            .into_iter()
            .map(|key| {
                let directory = state.entries.get(&key).is_some_and(Entry::is_container);
                (key, directory)
            })
            .collect();
        drop(state);

        self.client
            .counters
            .open_cursors
            .fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCursor {
            client: self.client.clone(),
            scheme: self.scheme.clone(),
            username: self.username.clone(),
            pending,
        }))
    }

    fn open_input(&self) -> Result<Box<dyn Read + Send>, SmbError> {
        self.check(Operation::OpenInput)?;
        let state = self.client.state.read();
        match &state.entry(&self.key)?.kind {
            EntryKind::File(data) => Ok(Box::new(Cursor::new(data.clone()))),
            _ => Err(SmbError::AccessDenied(format!(
                "'{}' is a directory",
                self.key
            ))),
        }
    }

    fn open_output(&self, append: bool) -> Result<Box<dyn Write + Send>, SmbError> {
        self.check(Operation::OpenOutput)?;
        self.require_in_share()?;
        let mut state = self.client.state.write();
        state.check_parent(&self.key)?;
        match state.entries.entry(self.key.clone()) {
            btree_map::Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.attributes & NativeAttributes::READONLY.bits() != 0 {
                    return Err(SmbError::AccessDenied(format!(
                        "'{}' is read-only",
                        self.key
                    )));
                }
                match &mut entry.kind {
                    EntryKind::File(data) if !append => data.clear(),
                    EntryKind::File(_) => {}
                    _ => {
                        return Err(SmbError::AccessDenied(format!(
                            "'{}' is a directory",
                            self.key
                        )));
                    }
                }
                entry.modified = SystemTime::now();
            }
            btree_map::Entry::Vacant(vacant) => {
                vacant.insert(Entry::new(EntryKind::File(Vec::new())));
            }
        }
        Ok(Box::new(MemoryWriter {
            client: self.client.clone(),
            key: self.key.clone(),
        }))
    }

    fn delete(&self) -> Result<(), SmbError> {
        self.check(Operation::Delete)?;
        self.require_in_share()?;
        let mut state = self.client.state.write();
        state.entry(&self.key)?;
        state.remove_subtree(&self.key);
        Ok(())
    }

    fn mkdir(&self) -> Result<(), SmbError> {
        self.check(Operation::Mkdir)?;
        self.require_in_share()?;
        let mut state = self.client.state.write();
        if state.entries.contains_key(&self.key) {
            return Err(SmbError::AlreadyExists(self.key.clone()));
        }
        state.check_parent(&self.key)?;
        state
            .entries
            .insert(self.key.clone(), Entry::new(EntryKind::Directory));
        Ok(())
    }

    fn rename_to(&self, dest: &dyn RemoteHandle) -> Result<(), SmbError> {
        self.client.counters.renames.fetch_add(1, Ordering::SeqCst);
        self.check(Operation::Rename)?;
        self.require_in_share()?;

        let dest_url = Url::parse(dest.url()).map_err(|_| SmbError::InvalidPath(dest.url().to_string()))?;
        let dest_path = percent_decode_str(dest_url.path()).decode_utf8_lossy();
        let dest_key = normalize_key(&format!(
            "{}{}",
            dest_url.host_str().unwrap_or_default(),
            dest_path
        ));

        if share_key(&dest_key) != share_key(&self.key) || key_depth(&dest_key) < 3 {
            return Err(SmbError::InvalidPath(format!(
                "can't rename '{}' to '{dest_key}' across shares",
                self.key
            )));
        }

        let mut state = self.client.state.write();
        state.entry(&self.key)?;
        if state.entries.contains_key(&dest_key) {
            return Err(SmbError::AlreadyExists(dest_key));
        }
        if dest_key.starts_with(&format!("{}/", self.key)) {
            return Err(SmbError::InvalidPath(format!(
                "can't move '{}' into itself",
                self.key
            )));
        }
        state.check_parent(&dest_key)?;

        let prefix = format!("{}/", self.key);
        let moved: Vec<(String, Entry)> = state
            .entries
            .iter()
            .filter(|(k, _)| **k == self.key || k.starts_with(&prefix))
            .map(|(k, e)| (format!("{dest_key}{}", &k[self.key.len()..]), e.clone()))
            .collect();
        state.remove_subtree(&self.key);
        state.entries.extend(moved);
        Ok(())
    }
}

/// Cursor over a snapshot of a directory's children.
struct MemoryCursor {
    client: MemoryClient,
    scheme: String,
    username: Option<String>,
    pending: VecDeque<(String, bool)>,
}

impl Iterator for MemoryCursor {
    type Item = Result<Arc<dyn RemoteHandle>, SmbError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, directory) = self.pending.pop_front()?;
        if let Err(e) = self.client.state.read().check(Operation::ListEntry, &key) {
            return Some(Err(e));
        }
        let handle = self
            .client
            .handle(&self.scheme, key, directory, self.username.as_deref());
        Some(Ok(Arc::new(handle)))
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.client
            .counters
            .open_cursors
            .fetch_sub(1, Ordering::SeqCst);
    }
}

/// Writes straight into the file entry.
struct MemoryWriter {
    client: MemoryClient,
    key: String,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.client.state.write();
        state
            .check(Operation::Write, &self.key)
            .map_err(|e| io::Error::new(io::ErrorKind::ConnectionAborted, e))?;
        let entry = state
            .entry_mut(&self.key)
            .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))?;
        match &mut entry.kind {
            EntryKind::File(data) => data.extend_from_slice(buf),
            _ => return Err(io::Error::other(format!("'{}' is not a file", self.key))),
        }
        entry.modified = SystemTime::now();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn normalize_key(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn key_depth(key: &str) -> usize {
    if key.is_empty() {
        0
    } else {
        key.matches('/').count() + 1
    }
}

fn parent_key(key: &str) -> &str {
    key.rfind('/').map_or("", |index| &key[..index])
}

/// `host/share` prefix of a key inside a share.
fn share_key(key: &str) -> Option<&str> {
    let mut separators = key.match_indices('/').map(|(index, _)| index);
    let _host_end = separators.next()?;
    Some(separators.next().map_or(key, |index| &key[..index]))
}
