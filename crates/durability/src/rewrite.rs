//! Background AOF rewrite: dumps a snapshot of every database to a
//! fresh file on a worker thread, so the event loop never blocks on
//! it, then hands the finished path back over a bounded channel.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver};
use std::thread;

use emberkv_core::limits::{AOF_REWRITE_ITEMS_PER_COMMAND, AOF_REWRITE_TEMP_PREFIX};
use emberkv_proto::format_score;
use emberkv_storage::{DatabaseSnapshot, ValueSnapshot};
use rand::Rng;

use crate::aof::encode_command;

/// Handle to a rewrite running on a worker thread. Poll from the
/// server cron; a single in-flight rewrite is enforced by the caller
/// (`Aof::begin_rewrite`'s guard), matching the source's
/// `backgroundTaskTypeAtomic` compare-and-swap.
pub struct RewriteHandle {
    rx: Receiver<io::Result<PathBuf>>,
}

impl RewriteHandle {
    /// Non-blocking check for completion.
    pub fn poll(&self) -> Option<io::Result<PathBuf>> {
        self.rx.try_recv().ok()
    }
}

/// Spawns the rewrite worker over `snapshots`, writing the new file
/// under `dir`. Returns immediately; the caller polls [`RewriteHandle`].
pub fn spawn_background_rewrite(snapshots: Vec<DatabaseSnapshot>, dir: &Path) -> RewriteHandle {
    let (tx, rx) = sync_channel(1);
    let dir = dir.to_path_buf();
    thread::spawn(move || {
        let result = write_rewrite_file(&snapshots, &dir);
        let _ = tx.send(result);
    });
    RewriteHandle { rx }
}

fn temp_path(dir: &Path) -> PathBuf {
    let suffix: u64 = rand::thread_rng().gen();
    dir.join(format!("{AOF_REWRITE_TEMP_PREFIX}{suffix:016x}"))
}

fn write_rewrite_file(snapshots: &[DatabaseSnapshot], dir: &Path) -> io::Result<PathBuf> {
    let path = temp_path(dir);
    let mut file = File::create(&path)?;

    for db in snapshots {
        if db.data_keys.is_empty() {
            continue;
        }

        file.write_all(&encode_command([b"select".to_vec(), db.id.to_string().into_bytes()]))?;

        let expire_by_key: HashMap<&str, i64> =
            db.expire.iter().map(|(k, v)| (k.as_str(), *v)).collect();

        for (key, value) in &db.data_keys {
            write_value(&mut file, key, value)?;
            if let Some(&when_ms) = expire_by_key.get(key.as_str()) {
                file.write_all(&encode_command([
                    b"expireat".to_vec(),
                    key.clone().into_bytes(),
                    (when_ms / 1000).to_string().into_bytes(),
                ]))?;
            }
        }
    }

    Ok(path)
}

fn write_value(file: &mut File, key: &str, value: &ValueSnapshot) -> io::Result<()> {
    match value {
        ValueSnapshot::String(s) => {
            file.write_all(&encode_command([b"set".to_vec(), key.as_bytes().to_vec(), s.clone()]))
        }
        ValueSnapshot::List(items) => write_chunked(file, "lpush", key, items.iter().cloned(), AOF_REWRITE_ITEMS_PER_COMMAND),
        ValueSnapshot::Hash(pairs) => {
            let flat = pairs.iter().flat_map(|(k, v)| [k.clone().into_bytes(), v.clone()]);
            write_chunked(file, "hset", key, flat, AOF_REWRITE_ITEMS_PER_COMMAND * 2)
        }
        ValueSnapshot::Set(members) => {
            write_chunked(file, "sadd", key, members.iter().map(|m| m.clone().into_bytes()), AOF_REWRITE_ITEMS_PER_COMMAND)
        }
        ValueSnapshot::Zset(members) => {
            let flat = members
                .iter()
                .flat_map(|(m, score)| [m.clone().into_bytes(), format_score(*score).into_bytes()]);
            write_chunked(file, "zadd", key, flat, AOF_REWRITE_ITEMS_PER_COMMAND * 2)
        }
    }
}

fn write_chunked(
    file: &mut File,
    cmd: &str,
    key: &str,
    items: impl Iterator<Item = Vec<u8>>,
    chunk_size: usize,
) -> io::Result<()> {
    let items: Vec<Vec<u8>> = items.collect();
    for chunk in items.chunks(chunk_size) {
        let mut args = vec![cmd.as_bytes().to_vec(), key.as_bytes().to_vec()];
        args.extend(chunk.iter().cloned());
        file.write_all(&encode_command(args))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_rewrite_file_skips_empty_databases() {
        let dir = tempdir().unwrap();
        let snapshots = vec![DatabaseSnapshot {
            id: 0,
            data_keys: Vec::new(),
            expire: Vec::new(),
        }];
        let path = write_rewrite_file(&snapshots, dir.path()).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.is_empty());
    }

    #[test]
    fn write_rewrite_file_emits_select_and_commands() {
        let dir = tempdir().unwrap();
        let snapshots = vec![DatabaseSnapshot {
            id: 2,
            data_keys: vec![("k".to_string(), ValueSnapshot::String(b"v".to_vec()))],
            expire: Vec::new(),
        }];
        let path = write_rewrite_file(&snapshots, dir.path()).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.to_lowercase().contains("select"));
        assert!(contents.to_lowercase().contains("set"));
    }

    #[test]
    fn write_rewrite_file_chunks_large_sets() {
        let dir = tempdir().unwrap();
        let members: Vec<String> = (0..150).map(|i| format!("m{i}")).collect();
        let snapshots = vec![DatabaseSnapshot {
            id: 0,
            data_keys: vec![("s".to_string(), ValueSnapshot::Set(members))],
            expire: Vec::new(),
        }];
        let path = write_rewrite_file(&snapshots, dir.path()).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        let sadd_count = contents.matches("sadd").count();
        assert_eq!(sadd_count, 3); // 150 members / 64 per command, rounded up
    }
}
