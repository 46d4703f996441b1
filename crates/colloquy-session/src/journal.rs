//! Optional write-through persistence for transcripts.

use async_trait::async_trait;
use colloquy_core::{ColloquyError, ColloquyResult, SessionId, Turn};
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::warn;

// ---------------------------------------------------------------------------
// TranscriptJournal trait
// ---------------------------------------------------------------------------

/// Append-only record of turns, replayed when a session is first touched.
///
/// Appends for one session are never issued concurrently: the store holds
/// that session's transcript lock for the duration of the call.
#[async_trait]
pub trait TranscriptJournal: Send + Sync {
    /// Durably records `turn` at the end of the session's journal.
    async fn append(&self, session_id: &SessionId, turn: &Turn) -> ColloquyResult<()>;
    /// Returns every recorded turn for the session, oldest first.
    async fn load(&self, session_id: &SessionId) -> ColloquyResult<Vec<Turn>>;
    /// Deletes the session's journal. Missing journals are not an error.
    async fn remove(&self, session_id: &SessionId) -> ColloquyResult<()>;
    /// Lists every session that has a journal.
    async fn list(&self) -> ColloquyResult<Vec<SessionId>>;
}

// ---------------------------------------------------------------------------
// FileTranscriptJournal
// ---------------------------------------------------------------------------

/// One JSON-Lines file per session under `dir`.
pub struct FileTranscriptJournal {
    dir: PathBuf,
}

impl FileTranscriptJournal {
    /// Opens (creating if needed) a journal directory.
    pub async fn new(dir: PathBuf) -> ColloquyResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn journal_path(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(format!("{session_id}.jsonl"))
    }
}

/// Makes sure the file ends on a line boundary before anything is appended.
///
/// An unterminated tail is left by a crash or a failed write. If it still
/// parses as a turn it only lacks its newline; otherwise it is cut off so
/// the next record starts on a fresh line.
async fn terminate_tail(file: &mut File, session_id: &SessionId) -> ColloquyResult<()> {
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(());
    }
    file.seek(SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    if last[0] == b'\n' {
        return Ok(());
    }

    file.seek(SeekFrom::Start(0)).await?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).await?;
    let keep = data
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |newline| newline + 1);

    if serde_json::from_slice::<Turn>(&data[keep..]).is_ok() {
        file.seek(SeekFrom::End(0)).await?;
        file.write_all(b"\n").await?;
    } else {
        warn!(
            session_id = %session_id,
            discarded_bytes = data.len() - keep,
            "Discarding torn journal tail"
        );
        file.set_len(keep as u64).await?;
    }
    Ok(())
}

#[async_trait]
impl TranscriptJournal for FileTranscriptJournal {
    async fn append(&self, session_id: &SessionId, turn: &Turn) -> ColloquyResult<()> {
        let path = self.journal_path(session_id);
        let mut line = serde_json::to_string(turn)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await?;
        terminate_tail(&mut file, session_id).await?;
        file.seek(SeekFrom::End(0)).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load(&self, session_id: &SessionId) -> ColloquyResult<Vec<Turn>> {
        let path = self.journal_path(session_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let lines: Vec<&str> = data.lines().filter(|l| !l.trim().is_empty()).collect();

        let mut turns = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            match serde_json::from_str::<Turn>(line) {
                Ok(turn) => turns.push(turn),
                // A torn final line means the process died mid-write.
                Err(e) if idx + 1 == lines.len() => {
                    warn!(session_id = %session_id, error = %e, "Ignoring truncated journal tail");
                }
                Err(e) => {
                    return Err(ColloquyError::Session(format!(
                        "corrupt journal for {session_id} at line {}: {e}",
                        idx + 1
                    )));
                }
            }
        }
        Ok(turns)
    }

    async fn remove(&self, session_id: &SessionId) -> ColloquyResult<()> {
        let path = self.journal_path(session_id);
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn list(&self) -> ColloquyResult<Vec<SessionId>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".jsonl") {
                    if let Ok(id) = SessionId::parse(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
