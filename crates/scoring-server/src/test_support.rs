use async_trait::async_trait;
use scoring_store::{EventStore, StoreError, StoredRecord};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// In-memory audit sink that can be inspected after the writer is moved.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub(crate) fn lines(&self) -> Vec<String> {
        let bytes = self.bytes.lock().unwrap();
        String::from_utf8(bytes.clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Event store stub that records every append and can be told to fail.
#[derive(Default)]
pub(crate) struct RecordingStore {
    calls: Mutex<Vec<(String, StoredRecord)>>,
    fail_with: Option<String>,
}

impl RecordingStore {
    pub(crate) fn failing(message: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<(String, StoredRecord)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventStore for RecordingStore {
    async fn append(&self, table: &str, record: &StoredRecord) -> scoring_store::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((table.to_string(), record.clone()));
        match &self.fail_with {
            Some(message) => Err(StoreError::Database(message.clone())),
            None => Ok(()),
        }
    }
}
