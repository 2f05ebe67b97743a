#![allow(missing_docs, clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt as _, TryStreamExt as _, stream};

use ipfs_mount::backend::{
    Backend, BackendError, ByteStream, LsEntry, MkdirOptions, ObjectKind, ObjectStat, RepoStat,
    RmOptions, WriteOptions,
};
use ipfs_mount::segment::Segment;

pub const NOT_FOUND: &str = "file does not exist";

/// One call to [`Backend::write`] or [`Backend::write_stream`] as seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub path: String,
    pub offset: u64,
    pub data: Vec<u8>,
    pub options: WriteOptions,
    pub streamed: bool,
}

/// Misbehaviors the mock can be told to exhibit.
#[derive(Debug, Default)]
pub struct Knobs {
    /// Reads return the whole object regardless of the requested segment.
    pub ignore_range: bool,
    /// Reads deliver the reply in chunks of this size.
    pub read_chunk: Option<usize>,
    /// Reads return at most this many bytes.
    pub read_cap: Option<usize>,
    /// Writes starting at or after this offset fail.
    pub fail_writes_from: Option<u64>,
    /// Message of the injected write failure.
    pub write_failure: Option<String>,
    /// Every `stat` fails with this message.
    pub stat_failure: Option<String>,
    /// Extra entries appended to every listing, e.g. nested ones.
    pub extra_ls: Vec<LsEntry>,
    /// Every write sleeps this long before applying.
    pub write_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    writes: Vec<WriteRecord>,
    flushes: Vec<String>,
    reads: Vec<(String, Segment)>,
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn is_below(path: &str, dir: &str) -> bool {
    (dir == "/" && path != "/") || path.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}

/// An in-memory object store.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
    pub knobs: Mutex<Knobs>,
    pub repo: Mutex<RepoStat>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        let mut state = State::default();
        state.dirs.insert("/".to_owned());
        Self {
            state: Mutex::new(state),
            knobs: Mutex::new(Knobs::default()),
            repo: Mutex::new(RepoStat::default()),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, contents: &[u8]) -> Self {
        self.put_file(path, contents);
        self
    }

    pub fn with_dir(self, path: &str) -> Self {
        self.state.lock().unwrap().dirs.insert(path.to_owned());
        self
    }

    pub fn put_file(&self, path: &str, contents: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_owned(), contents.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Non-empty writes, as `(offset, data)`.
    pub fn data_writes(&self) -> Vec<(u64, Vec<u8>)> {
        self.writes()
            .into_iter()
            .filter(|w| !w.data.is_empty())
            .map(|w| (w.offset, w.data))
            .collect()
    }

    pub fn flushes(&self) -> Vec<String> {
        self.state.lock().unwrap().flushes.clone()
    }

    pub fn reads(&self) -> Vec<(String, Segment)> {
        self.state.lock().unwrap().reads.clone()
    }

    fn check_write(&self, offset: u64) -> Result<(), BackendError> {
        let knobs = self.knobs.lock().unwrap();
        if knobs.fail_writes_from.is_some_and(|from| offset >= from) {
            let message = knobs
                .write_failure
                .clone()
                .unwrap_or_else(|| "write refused".to_owned());
            return Err(BackendError::remote(message));
        }
        Ok(())
    }

    fn apply_write(
        &self,
        path: &str,
        offset: u64,
        data: &[u8],
        options: WriteOptions,
        streamed: bool,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if state.dirs.contains(path) {
            return Err(BackendError::remote(format!("{path} is a directory")));
        }
        if !state.files.contains_key(path) {
            if !options.create {
                return Err(BackendError::remote(NOT_FOUND));
            }
            if !state.dirs.contains(parent_of(path)) {
                return Err(BackendError::remote(NOT_FOUND));
            }
        }
        let file = state.files.entry(path.to_owned()).or_default();
        if options.truncate {
            file.clear();
        }
        let start = usize::try_from(offset).unwrap();
        if file.len() < start + data.len() {
            file.resize(start + data.len(), 0);
        }
        file[start..start + data.len()].copy_from_slice(data);
        state.writes.push(WriteRecord {
            path: path.to_owned(),
            offset,
            data: data.to_vec(),
            options,
            streamed,
        });
        Ok(())
    }

    async fn delay(&self) {
        let delay = self.knobs.lock().unwrap().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn read(&self, path: &str, segment: Segment) -> Result<ByteStream, BackendError> {
        let contents = {
            let mut state = self.state.lock().unwrap();
            state.reads.push((path.to_owned(), segment));
            state
                .files
                .get(path)
                .cloned()
                .ok_or_else(|| BackendError::remote(NOT_FOUND))?
        };
        let knobs = self.knobs.lock().unwrap();
        let mut reply = if knobs.ignore_range {
            contents
        } else {
            let start = usize::try_from(segment.offset)
                .unwrap()
                .min(contents.len());
            let end = usize::try_from(segment.offset + segment.length)
                .unwrap()
                .min(contents.len());
            contents[start..end].to_vec()
        };
        if let Some(cap) = knobs.read_cap {
            reply.truncate(cap);
        }
        let chunk = knobs.read_chunk.unwrap_or(usize::MAX).max(1);
        let chunks: Vec<Result<Bytes, BackendError>> = reply
            .chunks(chunk)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn write(
        &self,
        path: &str,
        data: Bytes,
        segment: Segment,
        options: WriteOptions,
    ) -> Result<(), BackendError> {
        assert_eq!(segment.length, data.len() as u64, "segment must match data");
        self.delay().await;
        self.check_write(segment.offset)?;
        self.apply_write(path, segment.offset, &data, options, false)
    }

    async fn write_stream(
        &self,
        path: &str,
        offset: u64,
        data: ByteStream,
        options: WriteOptions,
    ) -> Result<(), BackendError> {
        let chunks: Vec<Bytes> = data.try_collect().await?;
        self.delay().await;
        self.check_write(offset)?;
        let data: Vec<u8> = chunks.concat();
        self.apply_write(path, offset, &data, options, true)
    }

    async fn ls(&self, path: &str) -> Result<Vec<LsEntry>, BackendError> {
        let state = self.state.lock().unwrap();
        if !state.dirs.contains(path) {
            return Err(BackendError::remote(NOT_FOUND));
        }
        let name = |child: &str| child.rsplit('/').next().unwrap_or_default().to_owned();
        let mut entries: Vec<LsEntry> = state
            .dirs
            .iter()
            .filter(|d| d.as_str() != "/" && parent_of(d) == path)
            .map(|d| LsEntry {
                name: name(d),
                depth: 1,
                kind: ObjectKind::Directory,
                size: 0,
            })
            .chain(
                state
                    .files
                    .iter()
                    .filter(|(f, _)| parent_of(f) == path)
                    .map(|(f, contents)| LsEntry {
                        name: name(f),
                        depth: 1,
                        kind: ObjectKind::File,
                        size: contents.len() as u64,
                    }),
            )
            .collect();
        drop(state);
        entries.extend(self.knobs.lock().unwrap().extra_ls.iter().cloned());
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<ObjectStat, BackendError> {
        if let Some(message) = self.knobs.lock().unwrap().stat_failure.clone() {
            return Err(BackendError::remote(message));
        }
        let state = self.state.lock().unwrap();
        if let Some(contents) = state.files.get(path) {
            return Ok(ObjectStat {
                kind: ObjectKind::File,
                size: contents.len() as u64,
                blocks: 1,
            });
        }
        if state.dirs.contains(path) {
            return Ok(ObjectStat {
                kind: ObjectKind::Directory,
                size: 0,
                blocks: 0,
            });
        }
        Err(BackendError::remote(NOT_FOUND))
    }

    async fn mkdir(&self, path: &str, options: MkdirOptions) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if state.dirs.contains(path) || state.files.contains_key(path) {
            return Err(BackendError::remote("file already exists"));
        }
        if !state.dirs.contains(parent_of(path)) {
            if !options.parents {
                return Err(BackendError::remote(NOT_FOUND));
            }
            let mut dir = parent_of(path);
            while dir != "/" {
                state.dirs.insert(dir.to_owned());
                dir = parent_of(dir);
            }
        }
        state.dirs.insert(path.to_owned());
        Ok(())
    }

    async fn rm(&self, path: &str, options: RmOptions) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if state.files.remove(path).is_some() {
            return Ok(());
        }
        if !state.dirs.contains(path) {
            return Err(BackendError::remote(NOT_FOUND));
        }
        if !options.recursive {
            return Err(BackendError::remote(format!("{path} is a directory, use -r to remove directories")));
        }
        state.dirs.retain(|d| d != path && !is_below(d, path));
        state.files.retain(|f, _| !is_below(f, path));
        Ok(())
    }

    async fn mv(&self, from: &str, to: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if let Some(contents) = state.files.remove(from) {
            state.files.insert(to.to_owned(), contents);
            return Ok(());
        }
        if !state.dirs.contains(from) {
            return Err(BackendError::remote(NOT_FOUND));
        }
        let rekey = |p: &str| format!("{to}{}", &p[from.len()..]);
        let dirs: Vec<String> = state
            .dirs
            .iter()
            .filter(|d| d.as_str() == from || is_below(d, from))
            .cloned()
            .collect();
        for dir in dirs {
            state.dirs.remove(&dir);
            state.dirs.insert(rekey(&dir));
        }
        let files: Vec<String> = state
            .files
            .keys()
            .filter(|f| is_below(f, from))
            .cloned()
            .collect();
        for file in files {
            if let Some(contents) = state.files.remove(&file) {
                state.files.insert(rekey(&file), contents);
            }
        }
        Ok(())
    }

    async fn flush(&self, path: &str) -> Result<(), BackendError> {
        self.state.lock().unwrap().flushes.push(path.to_owned());
        Ok(())
    }

    async fn repo_stat(&self) -> Result<RepoStat, BackendError> {
        Ok(*self.repo.lock().unwrap())
    }
}
