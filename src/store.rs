use std::fs::File;
use std::io::{BufWriter, Write};
use std::str;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use memmap2::{Mmap, MmapMut, MmapOptions};

// Wire values shared with the vector-tile command and type numbering.
pub const OP_END: i32 = 0;
pub const OP_MOVETO: i32 = 1;
pub const OP_LINETO: i32 = 2;
pub const OP_CLOSEPATH: i32 = 7;

pub const GEOM_POINT: i32 = 1;
pub const GEOM_LINE: i32 = 2;
pub const GEOM_POLYGON: i32 = 3;

pub const TAG_STRING: i32 = 1;
pub const TAG_NUMBER: i32 = 2;
pub const TAG_BOOLEAN: i32 = 7;

/// One fixed-size index record: the Morton key of a position inside the
/// feature and the byte offset of the feature's meta record. A feature
/// covering several base-zoom tiles appears once per covered tile, always
/// with the same offset.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct IndexEntry {
    pub key: u64,
    pub fpos: i64,
}

/// Append-only writer for the meta stream: little-endian i32/u32 plus
/// strings framed as length-including-NUL, bytes, NUL.
pub struct MetaWriter {
    out: BufWriter<File>,
    fpos: i64,
}

impl MetaWriter {
    fn new(file: File) -> Self {
        Self {
            out: BufWriter::new(file),
            fpos: 0,
        }
    }

    /// Offset the next write lands at.
    pub fn pos(&self) -> i64 {
        self.fpos
    }

    pub fn write_i32(&mut self, n: i32) -> Result<()> {
        self.out.write_i32::<LittleEndian>(n)?;
        self.fpos += 4;
        Ok(())
    }

    pub fn write_u32(&mut self, n: u32) -> Result<()> {
        self.out.write_u32::<LittleEndian>(n)?;
        self.fpos += 4;
        Ok(())
    }

    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_i32(s.len() as i32 + 1)?;
        self.out.write_all(s.as_bytes())?;
        self.out.write_all(&[0])?;
        self.fpos += s.len() as i64 + 1;
        Ok(())
    }
}

pub struct IndexWriter {
    out: BufWriter<File>,
    count: u64,
}

impl IndexWriter {
    fn new(file: File) -> Self {
        Self {
            out: BufWriter::new(file),
            count: 0,
        }
    }

    pub fn write(&mut self, entry: IndexEntry) -> Result<()> {
        self.out.write_all(bytemuck::bytes_of(&entry))?;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// The two-file external store backing one run. Both files are anonymous
/// temporaries: created already unlinked, so the OS reclaims them however
/// the process exits.
pub struct FeatureStore {
    pub meta: MetaWriter,
    pub index: IndexWriter,
}

impl FeatureStore {
    pub fn create() -> Result<Self> {
        let meta = tempfile::tempfile().context("create meta temp file")?;
        let index = tempfile::tempfile().context("create index temp file")?;
        Ok(Self {
            meta: MetaWriter::new(meta),
            index: IndexWriter::new(index),
        })
    }

    /// Close the writers, map both files, and sort the index in place by
    /// Morton key. Returns `None` when nothing was indexed; a zero-length
    /// file cannot be mapped.
    pub fn finish(self) -> Result<Option<SortedStore>> {
        if self.index.count == 0 {
            return Ok(None);
        }

        let meta_file = self
            .meta
            .out
            .into_inner()
            .map_err(|e| e.into_error())
            .context("flush meta file")?;
        let index_file = self
            .index
            .out
            .into_inner()
            .map_err(|e| e.into_error())
            .context("flush index file")?;

        let meta = unsafe { Mmap::map(&meta_file) }.context("mmap meta file")?;
        // Private copy-on-write: the sort below scribbles on our mapping,
        // never on the file.
        let mut index = unsafe { MmapOptions::new().map_copy(&index_file) }
            .context("mmap index file")?;

        bytemuck::cast_slice_mut::<u8, IndexEntry>(&mut index)
            .sort_unstable_by_key(|entry| entry.key);

        Ok(Some(SortedStore { meta, index }))
    }
}

/// Read-only view of the store after the sort: the meta stream and the
/// key-ordered index array, both memory mapped.
pub struct SortedStore {
    meta: Mmap,
    index: MmapMut,
}

impl SortedStore {
    pub fn meta(&self) -> &[u8] {
        &self.meta
    }

    pub fn entries(&self) -> &[IndexEntry] {
        bytemuck::cast_slice(&self.index)
    }
}

/// Cursor over one variable-length meta record inside the mapped stream.
pub struct MetaReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MetaReader<'a> {
    pub fn at(buf: &'a [u8], fpos: i64) -> Self {
        Self {
            buf,
            pos: fpos as usize,
        }
    }

    pub fn read_i32(&mut self) -> i32 {
        let n = LittleEndian::read_i32(&self.buf[self.pos..]);
        self.pos += 4;
        n
    }

    pub fn read_u32(&mut self) -> u32 {
        let n = LittleEndian::read_u32(&self.buf[self.pos..]);
        self.pos += 4;
        n
    }

    pub fn read_str(&mut self) -> &'a str {
        let len = self.read_i32() as usize;
        let bytes = &self.buf[self.pos..self.pos + len - 1];
        self.pos += len;
        str::from_utf8(bytes).expect("meta strings are UTF-8")
    }
}

/// Entries whose keys fall in the inclusive range `[start, end]`, clamped
/// to the array: the standard lower/upper bound pair over the sorted keys.
pub fn range_search(entries: &[IndexEntry], start: u64, end: u64) -> &[IndexEntry] {
    let lo = entries.partition_point(|e| e.key < start);
    let hi = entries.partition_point(|e| e.key <= end);
    &entries[lo..hi]
}
