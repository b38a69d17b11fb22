//! Version dispatch for chunk payloads
//!
//! Each supported `(id, version)` pair maps to a handler that decodes the
//! payload into the target object. Readers built on a registry step over
//! unknown ids silently and over unsupported versions with a warning, so
//! newer streams still load as far as this build understands them.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::Read;

use super::chunk::{ChunkReader, ChunkResult};

/// Decodes one payload into `T`
pub type ChunkHandler<T> = Box<dyn Fn(&mut T, &[u8]) -> ChunkResult<()> + Send + Sync>;

/// What a read did with each chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadReport {
    /// Chunks decoded by a handler
    pub applied: usize,
    /// Chunks whose id no handler knows
    pub unknown: usize,
    /// Chunks with a known id but no handler for their version
    pub unsupported_version: usize,
    /// Chunks whose handler rejected the payload
    pub rejected: usize,
}

impl ReadReport {
    /// True if every chunk was decoded
    pub fn is_complete(&self) -> bool {
        self.unknown == 0 && self.unsupported_version == 0 && self.rejected == 0
    }
}

/// Handler table for one target type
pub struct ChunkRegistry<T> {
    handlers: HashMap<(u32, u32), ChunkHandler<T>>,
}

impl<T> Default for ChunkRegistry<T> {
    fn default() -> Self {
        Self { handlers: HashMap::new() }
    }
}

impl<T> fmt::Debug for ChunkRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().collect();
        keys.sort_unstable();
        f.debug_struct("ChunkRegistry").field("handlers", &keys).finish()
    }
}

impl<T> ChunkRegistry<T> {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `(id, version)`; returns false if it replaced one
    pub fn register(
        &mut self,
        id: u32,
        version: u32,
        handler: impl Fn(&mut T, &[u8]) -> ChunkResult<()> + Send + Sync + 'static,
    ) -> bool {
        self.handlers.insert((id, version), Box::new(handler)).is_none()
    }

    /// Builder-style [`register`](Self::register)
    #[must_use]
    pub fn with(
        mut self,
        id: u32,
        version: u32,
        handler: impl Fn(&mut T, &[u8]) -> ChunkResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.register(id, version, handler);
        self
    }

    /// True if some version of `id` has a handler
    pub fn knows(&self, id: u32) -> bool {
        self.handlers.keys().any(|&(known, _)| known == id)
    }

    /// Versions of `id` with a handler, ascending
    pub fn versions(&self, id: u32) -> Vec<u32> {
        let versions: BTreeSet<u32> = self
            .handlers
            .keys()
            .filter(|&&(known, _)| known == id)
            .map(|&(_, version)| version)
            .collect();
        versions.into_iter().collect()
    }

    /// Read chunks until the terminator, applying each to `target`.
    ///
    /// Framing errors (I/O, truncation) abort the read; anything wrong with
    /// a single chunk is logged and the chunk skipped.
    pub fn read_into<R: Read>(&self, target: &mut T, reader: &mut ChunkReader<R>) -> ChunkResult<ReadReport> {
        let mut report = ReadReport::default();
        while let Some(header) = reader.next_header()? {
            let Some(handler) = self.handlers.get(&(header.id, header.version)) else {
                if self.knows(header.id) {
                    log::warn!(
                        "Skipping chunk {:#010x}: version {} not supported (have {:?})",
                        header.id,
                        header.version,
                        self.versions(header.id)
                    );
                    report.unsupported_version += 1;
                } else {
                    log::debug!("Skipping unknown chunk {:#010x} ({} bytes)", header.id, header.size);
                    report.unknown += 1;
                }
                reader.skip(&header)?;
                continue;
            };

            let payload = reader.read_payload(&header)?;
            match handler(target, &payload) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    log::warn!("Chunk {:#010x} v{} rejected: {}", header.id, header.version, e);
                    report.rejected += 1;
                }
            }
        }
        Ok(report)
    }

    /// [`read_into`](Self::read_into) over a whole stream
    pub fn read_stream<R: Read>(&self, target: &mut T, stream: R) -> ChunkResult<ReadReport> {
        self.read_into(target, &mut ChunkReader::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::chunk::{chunk_id, ChunkError, ChunkWriter, PayloadReader};

    const NUMBER: u32 = chunk_id(b"NUMB");
    const OTHER: u32 = chunk_id(b"OTHR");

    fn registry() -> ChunkRegistry<Vec<u32>> {
        ChunkRegistry::new()
            .with(NUMBER, 1, |out: &mut Vec<u32>, bytes| {
                let mut reader = PayloadReader::new(bytes);
                out.push(reader.u32()?);
                reader.finish()
            })
            .with(NUMBER, 2, |out: &mut Vec<u32>, bytes| {
                let mut reader = PayloadReader::new(bytes);
                out.push(reader.u32()? * 10);
                reader.finish()
            })
    }

    fn stream(chunks: &[(u32, u32, Vec<u8>)]) -> Vec<u8> {
        let mut writer = ChunkWriter::new(Vec::new());
        for (id, version, payload) in chunks {
            writer.write_chunk(*id, *version, payload).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_dispatch_by_version() {
        let bytes = stream(&[(NUMBER, 1, 3u32.to_le_bytes().to_vec()), (NUMBER, 2, 4u32.to_le_bytes().to_vec())]);
        let mut out = Vec::new();
        let report = registry().read_stream(&mut out, bytes.as_slice()).unwrap();
        assert_eq!(out, vec![3, 40]);
        assert_eq!(report.applied, 2);
        assert!(report.is_complete());
    }

    #[test]
    fn test_unknown_and_future_chunks_skipped() {
        let bytes = stream(&[
            (OTHER, 1, vec![0xAA; 7]),
            (NUMBER, 9, vec![0xBB; 5]),
            (NUMBER, 1, 5u32.to_le_bytes().to_vec()),
        ]);
        let mut out = Vec::new();
        let report = registry().read_stream(&mut out, bytes.as_slice()).unwrap();
        assert_eq!(out, vec![5]);
        assert_eq!(
            report,
            ReadReport { applied: 1, unknown: 1, unsupported_version: 1, rejected: 0 }
        );
    }

    #[test]
    fn test_rejected_payload_does_not_stop_the_read() {
        let bytes = stream(&[(NUMBER, 1, vec![1, 2]), (NUMBER, 1, 6u32.to_le_bytes().to_vec())]);
        let mut out = Vec::new();
        let report = registry().read_stream(&mut out, bytes.as_slice()).unwrap();
        assert_eq!(out, vec![6]);
        assert_eq!(report.rejected, 1);
    }

    #[test]
    fn test_truncated_stream_fails() {
        let mut bytes = stream(&[(OTHER, 1, vec![0; 16])]);
        bytes.truncate(20);
        let mut out = Vec::new();
        assert!(matches!(
            registry().read_stream(&mut out, bytes.as_slice()),
            Err(ChunkError::Truncated { .. })
        ));
    }

    #[test]
    fn test_versions_listed() {
        let registry = registry();
        assert_eq!(registry.versions(NUMBER), vec![1, 2]);
        assert!(!registry.knows(OTHER));
        let mut replaced = registry;
        assert!(!replaced.register(NUMBER, 1, |_, _| Ok(())));
    }
}
