//! On-disk block layout: transaction header, node encoding/decoding, and
//! the footer. Everything is little-endian and hand-packed — Rust gives us
//! no `__attribute__((packed))`, so every field is written and read through
//! explicit `to_le_bytes`/`from_le_bytes`, the way `parity-db`'s value
//! table header and entry layout do it.

use crate::error::{Error, Result};
use crate::io::RandomAccess;
use crate::node::{Node, HAS_META, HAS_VALUE};

pub(crate) const BLOCKTYPE_TRANSACTION: u8 = 0;
pub(crate) const BLOCKTYPE_FOOTER: u8 = 1;
#[allow(dead_code)]
pub(crate) const BLOCKTYPE_REMOVED_FOOTER: u8 = 2;

/// Above this many children, the node stores a dense 256-slot table instead
/// of a (symbol, offset) pair list: `256 - 256/8`.
pub(crate) const SPARSE_DENSE_THRESHOLD: usize = 256 - 256 / 8;

/// Read granularity for node decoding; nodes larger than this issue a
/// follow-up read for the tail.
pub(crate) const READ_CHUNK: usize = 4096;

/// This crate's own 8-byte magic, carried in every footer.
pub(crate) const SIGNATURE: [u8; 8] = *b"rdxst001";

pub(crate) const HEADER_SIZE: u64 = 1 + 8;
pub(crate) const FOOTER_SIZE: u64 = 1 + 8 + 8 + 8 + 8 + 8 + 8;

/// Transaction header: the very first bytes of a transaction region.
pub(crate) struct TransactionHeader {
    pub(crate) footer_off: u64,
}

impl TransactionHeader {
    pub(crate) fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0] = BLOCKTYPE_TRANSACTION;
        buf[1..9].copy_from_slice(&self.footer_off.to_le_bytes());
        buf
    }
}

/// The trailing 49-byte footer that names the live root and the reclaimed
/// gap. Always found at `filesize - FOOTER_SIZE`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Footer {
    pub(crate) root_off: u64,
    pub(crate) transaction_size: u64,
    pub(crate) transaction_id: u64,
    pub(crate) gap_begin: u64,
    pub(crate) gap_end: u64,
}

impl Footer {
    pub(crate) fn encode(&self) -> [u8; FOOTER_SIZE as usize] {
        let mut buf = [0u8; FOOTER_SIZE as usize];
        buf[0] = BLOCKTYPE_FOOTER;
        buf[1..9].copy_from_slice(&SIGNATURE);
        buf[9..17].copy_from_slice(&self.root_off.to_le_bytes());
        buf[17..25].copy_from_slice(&self.transaction_size.to_le_bytes());
        buf[25..33].copy_from_slice(&self.transaction_id.to_le_bytes());
        buf[33..41].copy_from_slice(&self.gap_begin.to_le_bytes());
        buf[41..49].copy_from_slice(&self.gap_end.to_le_bytes());
        buf
    }

    pub(crate) fn decode(buf: &[u8]) -> Result<Footer> {
        if buf.len() < FOOTER_SIZE as usize {
            return Err(Error::Corrupted("footer shorter than expected"));
        }
        if buf[1..9] != SIGNATURE {
            return Err(Error::Corrupted("bad footer signature"));
        }
        Ok(Footer {
            root_off: u64::from_le_bytes(buf[9..17].try_into().unwrap()),
            transaction_size: u64::from_le_bytes(buf[17..25].try_into().unwrap()),
            transaction_id: u64::from_le_bytes(buf[25..33].try_into().unwrap()),
            gap_begin: u64::from_le_bytes(buf[33..41].try_into().unwrap()),
            gap_end: u64::from_le_bytes(buf[41..49].try_into().unwrap()),
        })
    }
}

/// Read the footer of the last transaction in the file. An empty file is a
/// valid, empty database and decodes to a zeroed footer.
pub(crate) fn read_footer(io: &dyn RandomAccess) -> Result<(Footer, u64)> {
    let filesize = io.size()?;
    if filesize == 0 {
        return Ok((Footer::default(), 0));
    }
    if filesize < FOOTER_SIZE {
        return Err(Error::Corrupted("file shorter than one footer"));
    }
    let footer_pos = filesize - FOOTER_SIZE;
    let mut buf = vec![0u8; FOOTER_SIZE as usize];
    io.read_at(footer_pos, &mut buf)?;
    let footer = Footer::decode(&buf)?;
    if footer.transaction_size > footer_pos {
        return Err(Error::Corrupted("transaction_size overruns footer offset"));
    }
    Ok((footer, filesize))
}

/// Number of children actually present (in memory or known on disk).
fn nsubnodes(node: &Node) -> usize {
    node.nsubnodes()
}

/// Compute the exact encoded size of `node`.
pub(crate) fn node_disk_size(node: &Node) -> u64 {
    let mut size = 4 + 1 + 2 + 4; // size, type, nsubnodes, prefix_size
    if node.flags & HAS_VALUE != 0 {
        size += 4;
    }
    if node.flags & HAS_META != 0 {
        size += 4;
    }
    let n = nsubnodes(node);
    if n > SPARSE_DENSE_THRESHOLD {
        size += 256 * 8;
    } else {
        size += n * (1 + 8);
    }
    size += node.prefix.len() + node.value.len() + node.meta.len();
    size as u64
}

/// Encode one node into `out` at its already-known `disk_off`/`disk_size`.
pub(crate) fn encode_node(node: &Node, out: &mut Vec<u8>) {
    let n = nsubnodes(node);
    let mut buf = Vec::with_capacity(node.disk_size as usize);
    buf.extend_from_slice(&(node.disk_size as u32).to_le_bytes());
    buf.push(node.flags);
    buf.extend_from_slice(&(n as u16).to_le_bytes());
    buf.extend_from_slice(&(node.prefix.len() as u32).to_le_bytes());
    if node.flags & HAS_VALUE != 0 {
        buf.extend_from_slice(&(node.value.len() as u32).to_le_bytes());
    }
    if node.flags & HAS_META != 0 {
        buf.extend_from_slice(&(node.meta.len() as u32).to_le_bytes());
    }

    if n > SPARSE_DENSE_THRESHOLD {
        for edge in 0..256usize {
            let off = child_offset(node, edge);
            buf.extend_from_slice(&off.to_le_bytes());
        }
    } else {
        let mut symbols = Vec::with_capacity(n);
        let mut offsets = Vec::with_capacity(n);
        for edge in 0..256usize {
            let off = child_offset(node, edge);
            if off != 0 {
                symbols.push(edge as u8);
                offsets.push(off);
            }
        }
        buf.extend_from_slice(&symbols);
        for off in offsets {
            buf.extend_from_slice(&off.to_le_bytes());
        }
    }

    buf.extend_from_slice(&node.prefix);
    buf.extend_from_slice(&node.value);
    buf.extend_from_slice(&node.meta);

    debug_assert_eq!(buf.len() as u64, node.disk_size);
    out.extend_from_slice(&buf);
}

/// The disk offset to record for `edge`: the freshly assigned one if the
/// child is resident in memory (commit fills `disk_next` for those before
/// encoding), otherwise whatever on-disk offset was already known.
fn child_offset(node: &Node, edge: usize) -> u64 {
    node.disk_next[edge]
}

/// Decode one node starting at `offset`. Supports nodes larger than
/// [`READ_CHUNK`] by issuing a single follow-up read for the tail.
pub(crate) fn decode_node(io: &dyn RandomAccess, offset: u64) -> Result<Node> {
    let first = READ_CHUNK.min(io.size()?.saturating_sub(offset) as usize);
    let mut buf = vec![0u8; first];
    io.read_at(offset, &mut buf)?;
    if buf.len() < 11 {
        return Err(Error::Corrupted("node header shorter than expected"));
    }

    let size = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
    if size < buf.len() && size < READ_CHUNK {
        return Err(Error::Corrupted("node size smaller than bytes already read"));
    }

    // Node spans more than one read chunk: fetch the remainder in one shot.
    if size > buf.len() {
        let old_len = buf.len();
        buf.resize(size, 0);
        io.read_at(offset + old_len as u64, &mut buf[old_len..])?;
    }
    if buf.len() < size {
        return Err(Error::Corrupted("short read decoding node"));
    }

    let flags = buf[4];
    let nsub = u16::from_le_bytes(buf[5..7].try_into().unwrap()) as usize;
    let prefix_size = u32::from_le_bytes(buf[7..11].try_into().unwrap()) as usize;

    let mut pos = 11usize;

    let mut val_size = 0usize;
    let mut meta_size = 0usize;
    if flags & HAS_VALUE != 0 {
        val_size = u32::from_le_bytes(field(&buf, pos, 4)?.try_into().unwrap()) as usize;
        pos += 4;
    }
    if flags & HAS_META != 0 {
        meta_size = u32::from_le_bytes(field(&buf, pos, 4)?.try_into().unwrap()) as usize;
        pos += 4;
    }

    let mem_next = Box::new([None; 256]);
    let mut disk_next = Box::new([0u64; 256]);

    if nsub > SPARSE_DENSE_THRESHOLD {
        for edge in 0..256usize {
            disk_next[edge] = u64::from_le_bytes(field(&buf, pos, 8)?.try_into().unwrap());
            pos += 8;
        }
    } else {
        let symbols_start = pos;
        let offsets_start = pos + nsub;
        for i in 0..nsub {
            let sym = field(&buf, symbols_start + i, 1)?[0];
            let off = u64::from_le_bytes(field(&buf, offsets_start + i * 8, 8)?.try_into().unwrap());
            disk_next[sym as usize] = off;
        }
        pos = offsets_start + nsub * 8;
    }

    let prefix = field(&buf, pos, prefix_size)?.to_vec();
    pos += prefix_size;
    let value = field(&buf, pos, val_size)?.to_vec();
    pos += val_size;
    let meta = field(&buf, pos, meta_size)?.to_vec();

    Ok(Node {
        flags,
        prefix,
        value,
        meta,
        mem_next,
        disk_next,
        replaced_by: None,
        disk_size: size as u64,
        disk_off: offset,
    })
}

fn field(buf: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    buf.get(pos..pos + len)
        .ok_or(Error::Corrupted("node field extends past encoded size"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemStorage;
    use crate::node::Node;

    fn node_with_children(n: usize) -> Node {
        let mut node = Node {
            flags: HAS_VALUE,
            prefix: b"pre".to_vec(),
            value: b"val".to_vec(),
            meta: Vec::new(),
            mem_next: Box::new([None; 256]),
            disk_next: Box::new([0u64; 256]),
            replaced_by: None,
            disk_size: 0,
            disk_off: 0,
        };
        for edge in 0..n {
            node.disk_next[edge] = 1000 + edge as u64;
        }
        node.disk_size = node_disk_size(&node);
        node
    }

    fn roundtrip(node: Node) -> Node {
        let io = MemStorage::new();
        let mut buf = Vec::new();
        encode_node(&node, &mut buf);
        io.write_at(0, &buf).unwrap();
        decode_node(&io, 0).unwrap()
    }

    #[test]
    fn roundtrip_sparse_node_below_threshold() {
        let node = node_with_children(SPARSE_DENSE_THRESHOLD - 1);
        let decoded = roundtrip(node);
        assert_eq!(decoded.prefix, b"pre");
        assert_eq!(decoded.value, b"val");
        assert_eq!(decoded.disk_next[0], 1000);
        assert_eq!(decoded.disk_next[SPARSE_DENSE_THRESHOLD - 2], 1000 + (SPARSE_DENSE_THRESHOLD - 2) as u64);
    }

    #[test]
    fn roundtrip_dense_node_above_threshold() {
        let node = node_with_children(SPARSE_DENSE_THRESHOLD + 1);
        let decoded = roundtrip(node);
        assert_eq!(decoded.disk_next[0], 1000);
        assert_eq!(decoded.disk_next[SPARSE_DENSE_THRESHOLD], 1000 + SPARSE_DENSE_THRESHOLD as u64);
        assert_eq!(decoded.disk_next[SPARSE_DENSE_THRESHOLD + 1], 0);
    }

    #[test]
    fn roundtrip_node_spanning_more_than_one_read_chunk() {
        let mut node = node_with_children(0);
        node.value = vec![7u8; READ_CHUNK * 2];
        node.disk_size = node_disk_size(&node);
        let decoded = roundtrip(node);
        assert_eq!(decoded.value.len(), READ_CHUNK * 2);
        assert!(decoded.value.iter().all(|&b| b == 7));
    }

    #[test]
    fn read_footer_on_empty_file_is_default() {
        let io = MemStorage::new();
        let (footer, filesize) = read_footer(&io).unwrap();
        assert_eq!(filesize, 0);
        assert_eq!(footer.transaction_id, 0);
        assert_eq!(footer.gap_begin, 0);
    }

    #[test]
    fn footer_roundtrip() {
        let footer = Footer {
            root_off: 9,
            transaction_size: 42,
            transaction_id: 7,
            gap_begin: 0,
            gap_end: 100,
        };
        let decoded = Footer::decode(&footer.encode()).unwrap();
        assert_eq!(decoded.root_off, footer.root_off);
        assert_eq!(decoded.transaction_id, footer.transaction_id);
        assert_eq!(decoded.gap_end, footer.gap_end);
    }

    #[test]
    fn footer_decode_rejects_bad_signature() {
        let mut buf = [0u8; FOOTER_SIZE as usize];
        buf[0] = BLOCKTYPE_FOOTER;
        assert!(Footer::decode(&buf).is_err());
    }
}
