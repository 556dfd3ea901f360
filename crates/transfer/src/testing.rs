//! A scriptable in-memory [`FtpSession`] for tests.
//!
//! Files live in [`SharedFile`]s, data connections are [`MemoryStream`]s,
//! and every call is recorded so tests can assert on what the engine asked
//! the server to do.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use ftpflow_data_channel::{DataStream, MemoryFault, MemoryFile, MemoryStream, SharedFile};
use ftpflow_protocol::constants::NOOP_REPLY_CODE;
use ftpflow_protocol::{ChecksumAlgorithm, FtpReply};

use crate::TransferError;
use crate::checksum::checksum_bytes;
use crate::session::{FtpSession, SessionFuture};

/// One recorded session call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Exists(String),
    Size(String),
    Delete(String),
    DirExists(String),
    CreateDir(String),
    OpenWrite(String),
    OpenAppend(String),
    OpenRead(String, u64),
    Noop,
    Reply { drain_noops: bool },
    Checksum(String),
}

#[derive(Debug, Clone, Copy)]
enum Corruption {
    Always,
    Times(u32),
}

/// In-memory server state plus scripted behavior.
#[derive(Debug)]
pub struct MockSession {
    files: HashMap<String, SharedFile>,
    dirs: HashSet<String>,
    calls: Vec<SessionCall>,
    replies: VecDeque<FtpReply>,
    path_replies: HashMap<String, FtpReply>,
    last_opened: Option<String>,
    pending_noops: usize,
    faults: HashMap<String, MemoryFault>,
    failing_opens: HashSet<String>,
    failing_appends: HashSet<String>,
    algorithms: Vec<ChecksumAlgorithm>,
    corrupted: HashMap<String, Corruption>,
    noop_timeout: bool,
    reply_timeout: bool,
    sizes_hidden: bool,
    sizes_fail: bool,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(file: &SharedFile) -> std::sync::MutexGuard<'_, MemoryFile> {
    file.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found(path: &str) -> TransferError {
    TransferError::Reply(FtpReply::new("550", format!("{path}: No such file")))
}

impl MockSession {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            dirs: HashSet::from(["/".to_string()]),
            calls: Vec::new(),
            replies: VecDeque::new(),
            path_replies: HashMap::new(),
            last_opened: None,
            pending_noops: 0,
            faults: HashMap::new(),
            failing_opens: HashSet::new(),
            failing_appends: HashSet::new(),
            algorithms: ChecksumAlgorithm::PREFERENCE.to_vec(),
            corrupted: HashMap::new(),
            noop_timeout: false,
            reply_timeout: false,
            sizes_hidden: false,
            sizes_fail: false,
        }
    }

    // -- setup ---------------------------------------------------------------

    pub fn add_file(&mut self, path: &str, data: Vec<u8>) {
        self.files.insert(
            path.to_string(),
            Arc::new(Mutex::new(MemoryFile::with_data(data))),
        );
    }

    pub fn add_directory(&mut self, path: &str) {
        self.dirs.insert(path.to_string());
    }

    /// Arms a one-shot fault on the next data connection opened for `path`.
    pub fn inject_fault(&mut self, path: &str, fault: MemoryFault) {
        self.faults.insert(path.to_string(), fault);
    }

    /// Every data connection for `path` is refused.
    pub fn fail_open(&mut self, path: &str) {
        self.failing_opens.insert(path.to_string());
    }

    /// Append-mode data connections for `path` are refused.
    pub fn fail_append(&mut self, path: &str) {
        self.failing_appends.insert(path.to_string());
    }

    /// Queues the reply returned by the next transfer completion.
    pub fn push_reply(&mut self, reply: FtpReply) {
        self.replies.push_back(reply);
    }

    /// Completions of transfers on `path` return `reply`.
    pub fn reply_for(&mut self, path: &str, reply: FtpReply) {
        self.path_replies.insert(path.to_string(), reply);
    }

    pub fn reply_times_out(&mut self) {
        self.reply_timeout = true;
    }

    pub fn noop_times_out(&mut self) {
        self.noop_timeout = true;
    }

    /// Simulates a keep-alive reply already waiting on the control channel.
    pub fn queue_noop_reply(&mut self) {
        self.pending_noops += 1;
    }

    /// Size queries succeed but report nothing.
    pub fn hide_sizes(&mut self) {
        self.sizes_hidden = true;
    }

    /// Size queries fail outright.
    pub fn fail_size_queries(&mut self) {
        self.sizes_fail = true;
    }

    pub fn set_checksum_algorithms(&mut self, algorithms: Vec<ChecksumAlgorithm>) {
        self.algorithms = algorithms;
    }

    /// The server reports a wrong checksum for `path` on every query.
    pub fn corrupt_checksum(&mut self, path: &str) {
        self.corrupted.insert(path.to_string(), Corruption::Always);
    }

    /// The server reports a wrong checksum for `path` on the next `times` queries.
    pub fn corrupt_checksum_times(&mut self, path: &str, times: u32) {
        self.corrupted
            .insert(path.to_string(), Corruption::Times(times));
    }

    // -- inspection ------------------------------------------------------------

    pub fn calls(&self) -> &[SessionCall] {
        &self.calls
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.get(path).map(|file| lock(file).data.clone())
    }

    pub fn bytes_written(&self, path: &str) -> u64 {
        self.files
            .get(path)
            .map_or(0, |file| lock(file).bytes_written)
    }

    pub fn bytes_read(&self, path: &str) -> u64 {
        self.files.get(path).map_or(0, |file| lock(file).bytes_read)
    }

    pub fn has_directory(&self, path: &str) -> bool {
        self.dirs.contains(path)
    }

    pub fn pending_noop_replies(&self) -> usize {
        self.pending_noops
    }

    // -- internals ---------------------------------------------------------------

    fn stream(&mut self, path: &str, file: SharedFile, offset: u64) -> Box<dyn DataStream> {
        self.last_opened = Some(path.to_string());
        let mut stream = MemoryStream::new(file, offset);
        if let Some(fault) = self.faults.remove(path) {
            stream = stream.with_fault(fault);
        }
        Box::new(stream)
    }

    fn check_open(&self, path: &str) -> Result<(), TransferError> {
        if self.failing_opens.contains(path) {
            return Err(TransferError::Reply(FtpReply::new(
                "550",
                "Permission denied",
            )));
        }
        Ok(())
    }

    fn next_reply(&mut self) -> FtpReply {
        if let Some(reply) = self
            .last_opened
            .take()
            .and_then(|path| self.path_replies.get(&path).cloned())
        {
            return reply;
        }
        self.replies
            .pop_front()
            .unwrap_or_else(|| FtpReply::new("226", "Transfer complete"))
    }
}

impl FtpSession for MockSession {
    fn open_write<'a>(
        &'a mut self,
        path: &'a str,
        _size_hint: Option<u64>,
    ) -> SessionFuture<'a, Box<dyn DataStream>> {
        Box::pin(async move {
            self.calls.push(SessionCall::OpenWrite(path.to_string()));
            self.check_open(path)?;
            let file: SharedFile = Arc::new(Mutex::new(MemoryFile::default()));
            self.files.insert(path.to_string(), Arc::clone(&file));
            Ok(self.stream(path, file, 0))
        })
    }

    fn open_append<'a>(
        &'a mut self,
        path: &'a str,
        _size_hint: Option<u64>,
    ) -> SessionFuture<'a, Box<dyn DataStream>> {
        Box::pin(async move {
            self.calls.push(SessionCall::OpenAppend(path.to_string()));
            self.check_open(path)?;
            if self.failing_appends.contains(path) {
                return Err(TransferError::Reply(FtpReply::new(
                    "550",
                    "Append not allowed",
                )));
            }
            let file = Arc::clone(
                self.files
                    .entry(path.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(MemoryFile::default()))),
            );
            let end = lock(&file).data.len() as u64;
            Ok(self.stream(path, file, end))
        })
    }

    fn open_read<'a>(
        &'a mut self,
        path: &'a str,
        offset: u64,
    ) -> SessionFuture<'a, Box<dyn DataStream>> {
        Box::pin(async move {
            self.calls
                .push(SessionCall::OpenRead(path.to_string(), offset));
            self.check_open(path)?;
            let file = self.files.get(path).cloned().ok_or_else(|| not_found(path))?;
            Ok(self.stream(path, file, offset))
        })
    }

    fn file_exists<'a>(&'a mut self, path: &'a str) -> SessionFuture<'a, bool> {
        Box::pin(async move {
            self.calls.push(SessionCall::Exists(path.to_string()));
            Ok(self.files.contains_key(path))
        })
    }

    fn file_size<'a>(&'a mut self, path: &'a str) -> SessionFuture<'a, Option<u64>> {
        Box::pin(async move {
            self.calls.push(SessionCall::Size(path.to_string()));
            if self.sizes_fail {
                return Err(TransferError::Reply(FtpReply::new(
                    "500",
                    "SIZE not understood",
                )));
            }
            let file = self.files.get(path).ok_or_else(|| not_found(path))?;
            if self.sizes_hidden {
                return Ok(None);
            }
            Ok(Some(lock(file).data.len() as u64))
        })
    }

    fn delete_file<'a>(&'a mut self, path: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            self.calls.push(SessionCall::Delete(path.to_string()));
            self.files
                .remove(path)
                .map(|_| ())
                .ok_or_else(|| not_found(path))
        })
    }

    fn directory_exists<'a>(&'a mut self, path: &'a str) -> SessionFuture<'a, bool> {
        Box::pin(async move {
            self.calls.push(SessionCall::DirExists(path.to_string()));
            Ok(self.dirs.contains(path))
        })
    }

    fn create_directory<'a>(&'a mut self, path: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            self.calls.push(SessionCall::CreateDir(path.to_string()));
            self.dirs.insert(path.to_string());
            Ok(())
        })
    }

    fn noop(&mut self) -> SessionFuture<'_, bool> {
        Box::pin(async move {
            self.calls.push(SessionCall::Noop);
            if self.noop_timeout {
                return Err(TransferError::Timeout);
            }
            self.pending_noops += 1;
            Ok(true)
        })
    }

    fn get_reply(&mut self, drain_noops: bool) -> SessionFuture<'_, FtpReply> {
        Box::pin(async move {
            self.calls.push(SessionCall::Reply { drain_noops });
            if self.reply_timeout {
                return Err(TransferError::Timeout);
            }
            if drain_noops {
                self.pending_noops = 0;
            } else if self.pending_noops > 0 {
                self.pending_noops -= 1;
                return Ok(FtpReply::new(NOOP_REPLY_CODE, "NOOP ok"));
            }
            Ok(self.next_reply())
        })
    }

    fn checksum_algorithms(&self) -> Vec<ChecksumAlgorithm> {
        self.algorithms.clone()
    }

    fn remote_checksum<'a>(
        &'a mut self,
        path: &'a str,
        algorithm: ChecksumAlgorithm,
    ) -> SessionFuture<'a, String> {
        Box::pin(async move {
            self.calls.push(SessionCall::Checksum(path.to_string()));
            let file = self.files.get(path).ok_or_else(|| not_found(path))?;
            let digest = checksum_bytes(algorithm, &lock(file).data);

            let corrupt = match self.corrupted.get_mut(path) {
                Some(Corruption::Always) => true,
                Some(Corruption::Times(left)) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            };
            if corrupt {
                return Ok("0".repeat(digest.len()));
            }
            Ok(digest.to_uppercase())
        })
    }
}
