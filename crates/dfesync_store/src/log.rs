//! Append-only framed record logs.
//!
//! Every record is one frame:
//!
//! ```text
//! | len (4, LE) | crc32 (4, LE) | CBOR payload (len) |
//! ```
//!
//! Opening a log replays every intact frame. The first frame that is short
//! or fails its checksum marks a torn tail, which is truncated away.

use crate::error::{StoreError, StoreResult};
use dfesync_storage::StorageBackend;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Size of the frame header.
pub(crate) const HEADER_SIZE: usize = 8;

/// Computes the IEEE CRC32 of `data`.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}

fn encode_frame<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(value, &mut payload).map_err(|e| StoreError::Encode(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| StoreError::Encode(format!("record of {} bytes", payload.len())))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&compute_crc32(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

/// Returns the payload of the intact frame at the start of `buf`.
fn next_frame(buf: &[u8]) -> Option<&[u8]> {
    if buf.len() < HEADER_SIZE {
        return None;
    }
    let len = read_u32(&buf[..4]) as usize;
    let crc = read_u32(&buf[4..8]);
    let payload = buf.get(HEADER_SIZE..HEADER_SIZE.checked_add(len)?)?;
    (compute_crc32(payload) == crc).then_some(payload)
}

/// A CBOR record log over a storage backend.
pub(crate) struct RecordLog {
    name: &'static str,
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_write: bool,
}

impl RecordLog {
    /// Opens a log, returning it with every intact record and its offset.
    pub(crate) fn open<T: DeserializeOwned>(
        name: &'static str,
        mut backend: Box<dyn StorageBackend>,
        sync_on_write: bool,
    ) -> StoreResult<(Self, Vec<(u64, T)>)> {
        let data = backend.read_all()?;
        let mut records = Vec::new();
        let mut offset = 0usize;

        while let Some(payload) = next_frame(&data[offset..]) {
            let value = ciborium::from_reader(payload)
                .map_err(|e| StoreError::corruption(name, format!("at offset {offset}: {e}")))?;
            records.push((offset as u64, value));
            offset += HEADER_SIZE + payload.len();
        }

        if offset < data.len() {
            warn!(
                log = name,
                offset,
                dropped = data.len() - offset,
                "truncating torn tail"
            );
            backend.truncate(offset as u64)?;
            backend.sync()?;
        }
        debug!(log = name, records = records.len(), "replayed log");

        Ok((
            Self {
                name,
                backend: Mutex::new(backend),
                sync_on_write,
            },
            records,
        ))
    }

    /// Appends a record and returns its offset.
    pub(crate) fn append<T: Serialize>(&self, value: &T) -> StoreResult<u64> {
        let frame = encode_frame(value)?;
        let mut backend = self.backend.lock();
        let offset = backend.append(&frame)?;
        if self.sync_on_write {
            backend.sync()?;
        }
        Ok(offset)
    }

    /// Reads the record at `offset`.
    pub(crate) fn read<T: DeserializeOwned>(&self, offset: u64) -> StoreResult<T> {
        let backend = self.backend.lock();
        let header = backend.read_at(offset, HEADER_SIZE)?;
        let len = read_u32(&header[..4]) as usize;
        let crc = read_u32(&header[4..8]);
        let payload = backend.read_at(offset + HEADER_SIZE as u64, len)?;
        if compute_crc32(&payload) != crc {
            return Err(StoreError::corruption(
                self.name,
                format!("checksum mismatch at offset {offset}"),
            ));
        }
        ciborium::from_reader(payload.as_slice())
            .map_err(|e| StoreError::corruption(self.name, format!("at offset {offset}: {e}")))
    }

    /// Atomically replaces the log with `values`, returning their new offsets.
    pub(crate) fn rewrite<'a, T, I>(&self, values: I) -> StoreResult<Vec<u64>>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut data = Vec::new();
        let mut offsets = Vec::new();
        for value in values {
            offsets.push(data.len() as u64);
            data.extend_from_slice(&encode_frame(value)?);
        }

        let mut backend = self.backend.lock();
        let before = backend.size()?;
        backend.replace(&data)?;
        backend.sync()?;
        debug!(log = self.name, before, after = data.len(), "compacted log");
        Ok(offsets)
    }

    /// Current size in bytes.
    pub(crate) fn size(&self) -> StoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }
}

#[derive(Serialize)]
enum EntryRef<'a, V> {
    Put { key: &'a str, value: &'a V },
    Remove { key: &'a str },
}

#[derive(Deserialize)]
enum Entry<V> {
    Put { key: String, value: V },
    Remove { key: String },
}

/// A string-keyed map persisted as a log of puts and removes.
///
/// The whole map lives in memory; every mutation is appended to the log
/// before the map changes.
pub(crate) struct KeyedLog<V> {
    log: RecordLog,
    map: RwLock<BTreeMap<String, V>>,
}

impl<V> KeyedLog<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    pub(crate) fn open(
        name: &'static str,
        backend: Box<dyn StorageBackend>,
        sync_on_write: bool,
    ) -> StoreResult<Self> {
        let (log, entries) = RecordLog::open::<Entry<V>>(name, backend, sync_on_write)?;
        let mut map = BTreeMap::new();
        for (_, entry) in entries {
            match entry {
                Entry::Put { key, value } => {
                    map.insert(key, value);
                }
                Entry::Remove { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(Self {
            log,
            map: RwLock::new(map),
        })
    }

    pub(crate) fn get(&self, key: &str) -> Option<V> {
        self.map.read().get(key).cloned()
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.map.read().contains_key(key)
    }

    pub(crate) fn put(&self, key: &str, value: V) -> StoreResult<()> {
        let mut map = self.map.write();
        self.log.append(&EntryRef::Put { key, value: &value })?;
        map.insert(key.to_string(), value);
        Ok(())
    }

    /// Read-modify-write under the map lock. `f` returns the value to store,
    /// or `None` to leave the entry untouched.
    pub(crate) fn update<F>(&self, key: &str, f: F) -> StoreResult<Option<V>>
    where
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let mut map = self.map.write();
        let Some(value) = f(map.get(key)) else {
            return Ok(None);
        };
        self.log.append(&EntryRef::Put { key, value: &value })?;
        map.insert(key.to_string(), value.clone());
        Ok(Some(value))
    }

    pub(crate) fn remove(&self, key: &str) -> StoreResult<Option<V>> {
        let mut map = self.map.write();
        if !map.contains_key(key) {
            return Ok(None);
        }
        let entry: EntryRef<'_, V> = EntryRef::Remove { key };
        self.log.append(&entry)?;
        Ok(map.remove(key))
    }

    pub(crate) fn entries(&self) -> Vec<(String, V)> {
        self.map
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Rewrites the log with one put per live key.
    pub(crate) fn compact(&self) -> StoreResult<()> {
        let map = self.map.write();
        let entries: Vec<EntryRef<'_, V>> = map
            .iter()
            .map(|(key, value)| EntryRef::Put {
                key: key.as_str(),
                value,
            })
            .collect();
        self.log.rewrite(&entries)?;
        Ok(())
    }

    pub(crate) fn size(&self) -> StoreResult<u64> {
        self.log.size()
    }
}
