//! Append-only file persistence: feed buffer, fsync policies, and
//! replay. Background rewrite lives in [`crate::rewrite`].

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use emberkv_proto::{Reply, RequestParser};
use tracing::warn;

/// When the AOF file is synced to disk, mirroring `appendfsync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    /// Fsync after every write. Safest, slowest.
    Always,
    /// Fsync at most once per second, off the calling thread.
    EverySecond,
    /// Never fsync explicitly; rely on the OS's own writeback.
    Never,
}

/// Encodes one command the way it is replayed: a RESP multi-bulk
/// array of bulk strings. This is the same wire shape a live client
/// sends, so the AOF file is literally a recording of requests.
pub fn encode_command<I, S>(args: I) -> Vec<u8>
where
    I: IntoIterator<Item = S>,
    S: Into<Vec<u8>>,
{
    let items: Vec<Reply> = args.into_iter().map(|a| Reply::Bulk(a.into())).collect();
    Reply::Array(items).to_bytes()
}

/// Owns the live AOF file and the buffer commands are fed into
/// between event loop iterations.
pub struct Aof {
    file: File,
    path: PathBuf,
    feed_buf: Vec<u8>,
    rewrite_buf: Option<Vec<u8>>,
    current_size: u64,
    policy: FsyncPolicy,
    last_fsync: Instant,
    fsync_in_flight: Arc<AtomicBool>,
    select_db: Option<usize>,
}

impl Aof {
    /// Opens (creating if absent) the AOF file for appending.
    pub fn open(path: impl Into<PathBuf>, policy: FsyncPolicy) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let current_size = file.metadata()?.len();
        Ok(Aof {
            file,
            path,
            feed_buf: Vec::new(),
            rewrite_buf: None,
            current_size,
            policy,
            last_fsync: Instant::now(),
            fsync_in_flight: Arc::new(AtomicBool::new(false)),
            select_db: None,
        })
    }

    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    /// Changes the fsync policy on a live AOF, e.g. after a `SIGHUP`
    /// config reload. Does not reopen the file.
    pub fn set_fsync_policy(&mut self, policy: FsyncPolicy) {
        self.policy = policy;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one just-executed command to the feed buffer, prefixed
    /// with a `SELECT` if the target db changed since the last feed,
    /// and translating `EXPIRE`/`SETEX` into their absolute-time forms
    /// so replay is correct regardless of when it runs.
    pub fn feed(&mut self, db_index: usize, args: &[Vec<u8>]) {
        let mut out = Vec::new();

        if self.select_db != Some(db_index) {
            self.select_db = Some(db_index);
            out.extend(encode_command([b"select".to_vec(), db_index.to_string().into_bytes()]));
        }

        let name = args.first().map(|a| a.to_ascii_lowercase()).unwrap_or_default();
        match name.as_slice() {
            b"expire" if args.len() == 3 => {
                out.extend(encode_expireat(&args[1], &args[2]));
            }
            b"setex" if args.len() == 4 => {
                out.extend(encode_command([b"set".to_vec(), args[1].clone(), args[3].clone()]));
                out.extend(encode_expireat(&args[1], &args[2]));
            }
            _ => out.extend(encode_command(args.iter().cloned())),
        }

        self.feed_buf.extend_from_slice(&out);
        if let Some(rewrite_buf) = self.rewrite_buf.as_mut() {
            rewrite_buf.extend_from_slice(&out);
        }
    }

    /// Writes the feed buffer to disk and applies the fsync policy.
    /// Called from the event loop's before-sleep hook.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.feed_buf.is_empty() {
            return Ok(());
        }
        self.file.write_all(&self.feed_buf)?;
        self.current_size += self.feed_buf.len() as u64;
        self.feed_buf.clear();
        self.sync_if_needed()
    }

    fn sync_if_needed(&mut self) -> io::Result<()> {
        match self.policy {
            FsyncPolicy::Never => Ok(()),
            FsyncPolicy::Always => {
                self.file.sync_all()?;
                self.last_fsync = Instant::now();
                Ok(())
            }
            FsyncPolicy::EverySecond => {
                if self.last_fsync.elapsed().as_secs() < 1 {
                    return Ok(());
                }
                if self
                    .fsync_in_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    let guard = Arc::clone(&self.fsync_in_flight);
                    if let Ok(cloned) = self.file.try_clone() {
                        std::thread::spawn(move || {
                            if let Err(e) = cloned.sync_all() {
                                warn!(error = %e, "AOF fsync failed");
                            }
                            guard.store(false, Ordering::SeqCst);
                        });
                    } else {
                        self.fsync_in_flight.store(false, Ordering::SeqCst);
                    }
                }
                self.last_fsync = Instant::now();
                Ok(())
            }
        }
    }

    /// Marks a background rewrite as started: subsequent `feed` calls
    /// also accumulate into a side buffer that will be appended to the
    /// new file once the rewrite completes. Returns `false` if a
    /// rewrite is already in progress.
    pub fn begin_rewrite(&mut self) -> bool {
        if self.rewrite_buf.is_some() {
            return false;
        }
        self.rewrite_buf = Some(Vec::new());
        true
    }

    /// Completes a background rewrite: swaps in the freshly written
    /// file at `tmp_path`, appends whatever was fed during the
    /// rewrite, and restats the file for the next auto-rewrite trigger
    /// check. `rename` is tried first; a cross-device temp directory
    /// falls back to copy-then-remove, matching the source's
    /// `mv`-over-`os.Rename` workaround.
    pub fn finish_rewrite(&mut self, tmp_path: &Path) -> io::Result<()> {
        match std::fs::rename(tmp_path, &self.path) {
            Ok(()) => {}
            Err(_) => {
                std::fs::copy(tmp_path, &self.path)?;
                std::fs::remove_file(tmp_path)?;
            }
        }

        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        if let Some(rewrite_buf) = self.rewrite_buf.take() {
            if !rewrite_buf.is_empty() {
                self.file.write_all(&rewrite_buf)?;
            }
        }

        self.current_size = self.file.metadata()?.len();
        self.select_db = None;
        self.sync_if_needed()
    }
}

fn encode_expireat(key: &[u8], seconds_arg: &[u8]) -> Vec<u8> {
    let seconds: i64 = std::str::from_utf8(seconds_arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let now_secs = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock before epoch").as_secs() as i64;
    let when = now_secs + seconds;
    encode_command([b"expireat".to_vec(), key.to_vec(), when.to_string().into_bytes()])
}

/// Replays every command recorded in `path` through `apply`, in
/// order. Uses the same incremental RESP parser live connections use,
/// since the AOF file is wire-identical to a request stream.
pub fn replay_commands<F>(path: &Path, mut apply: F) -> io::Result<()>
where
    F: FnMut(Vec<Vec<u8>>),
{
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let mut parser = RequestParser::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        parser.feed(&buf[..n]);
        while let Some(args) = parser
            .next_command()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?
        {
            if !args.is_empty() {
                apply(args);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn feed_then_flush_writes_select_prefixed_command() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.aof");
        let mut aof = Aof::open(&path, FsyncPolicy::Always).unwrap();
        aof.feed(0, &[b"set".to_vec(), b"k".to_vec(), b"v".to_vec()]);
        aof.flush().unwrap();

        let contents = std::fs::read(&path).unwrap();
        let text = String::from_utf8(contents).unwrap();
        assert!(text.contains("select"));
        assert!(text.contains("set"));
    }

    #[test]
    fn expire_is_translated_to_expireat() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.aof");
        let mut aof = Aof::open(&path, FsyncPolicy::Never).unwrap();
        aof.feed(0, &[b"expire".to_vec(), b"k".to_vec(), b"100".to_vec()]);
        aof.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.to_lowercase().contains("expireat"));
        assert!(!contents.to_lowercase().contains("\r\nexpire\r\n"));
    }

    #[test]
    fn replay_round_trips_fed_commands() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.aof");
        let mut aof = Aof::open(&path, FsyncPolicy::Always).unwrap();
        aof.feed(0, &[b"set".to_vec(), b"a".to_vec(), b"1".to_vec()]);
        aof.feed(0, &[b"set".to_vec(), b"b".to_vec(), b"2".to_vec()]);
        aof.flush().unwrap();

        let mut seen = Vec::new();
        replay_commands(&path, |args| seen.push(args)).unwrap();

        assert_eq!(seen.len(), 3); // select + 2 sets
        assert_eq!(seen[0], vec![b"select".to_vec(), b"0".to_vec()]);
        assert_eq!(seen[1], vec![b"set".to_vec(), b"a".to_vec(), b"1".to_vec()]);
    }

    #[test]
    fn second_select_for_same_db_is_not_repeated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.aof");
        let mut aof = Aof::open(&path, FsyncPolicy::Always).unwrap();
        aof.feed(0, &[b"set".to_vec(), b"a".to_vec(), b"1".to_vec()]);
        aof.feed(0, &[b"set".to_vec(), b"b".to_vec(), b"2".to_vec()]);
        aof.flush().unwrap();

        let mut selects = 0;
        replay_commands(&path, |args| {
            if args[0] == b"select" {
                selects += 1;
            }
        })
        .unwrap();
        assert_eq!(selects, 1);
    }
}
