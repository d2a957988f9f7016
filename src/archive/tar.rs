//! archive::tar
//!
//! In-memory tar parsing for `git archive` output.
//!
//! # Invariants
//!
//! - The whole stream is already buffered; parsing walks 512-byte
//!   blocks and never copies entry payloads. Entries carry (offset,
//!   length) positions into the shared buffer
//! - Size and mtime fields are untrusted; short buffers and bad octal
//!   are [`Error::Parse`], never panics
//! - Only entry *locations* are produced here; lazy payload access
//!   lives in [`super::FileHandle`]
//!
//! # Format coverage
//!
//! ustar headers with prefix+name reassembly, GNU longname (`L`)
//! records, PAX per-file (`x`) `path=` overrides, PAX global (`g`)
//! records (git emits a `pax_global_header` carrying the commit id;
//! consumed and skipped), and old-style GNU sparse (`S`) entries whose
//! payload is recorded as a list of (offset, length) segments. This is
//! an extraction-oriented parser for git's own output, not a general
//! tar library.

use crate::error::{Error, Result};
use crate::text::decode_lossy;

pub(crate) const BLOCK_LEN: usize = 512;

const TYPE_OFFSET: usize = 156;
const USTAR_MAGIC_OFFSET: usize = 257;
const PREFIX_OFFSET: usize = 345;
const SPARSE_MAP_OFFSET: usize = 386;
const SPARSE_EXTENDED_OFFSET: usize = 482;
const SPARSE_REALSIZE_OFFSET: usize = 483;

/// Where an entry's bytes live in the shared buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segments {
    /// One contiguous run.
    Contiguous { offset: usize, len: usize },
    /// Disjoint (offset, length) runs, concatenated on read.
    Sparse(Vec<(usize, usize)>),
}

/// One regular-file entry.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub name: String,
    pub size: u64,
    pub mtime: i64,
    pub segments: Segments,
}

/// Parse a buffered tar stream into its regular-file entries.
///
/// Directories, symlinks, and link/device entries are skipped.
/// An empty buffer parses to zero entries.
pub(crate) fn parse(buffer: &[u8]) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    let mut pos = 0usize;
    let mut zero_blocks = 0u8;
    let mut longname: Option<String> = None;
    let mut pax_path: Option<String> = None;

    while pos < buffer.len() {
        let header = block(buffer, pos)?;
        pos += BLOCK_LEN;

        if header.iter().all(|&b| b == 0) {
            zero_blocks += 1;
            if zero_blocks >= 2 {
                break;
            }
            continue;
        }
        zero_blocks = 0;

        let typeflag = header[TYPE_OFFSET];
        let size = parse_octal(&header[124..136])
            .ok_or_else(|| Error::Parse("bad tar size field".to_string()))?;
        let mtime = parse_octal(&header[136..148])
            .ok_or_else(|| Error::Parse("bad tar mtime field".to_string()))? as i64;
        let data_start = pos;

        match typeflag {
            // GNU longname: payload is the next entry's name.
            b'L' => {
                let bytes = payload(buffer, data_start, size)?;
                longname = Some(decode_lossy(trim_name(bytes)));
                pos = data_start + padded(size);
            }
            // PAX per-file header: keep only a `path` override.
            b'x' => {
                let bytes = payload(buffer, data_start, size)?;
                pax_path = parse_pax_path(bytes);
                pos = data_start + padded(size);
            }
            // PAX global header: consumed, never applied.
            b'g' => {
                payload(buffer, data_start, size)?;
                pos = data_start + padded(size);
            }
            // Regular file.
            b'0' | 0 => {
                payload(buffer, data_start, size)?;
                let name = resolve_name(header, &mut longname, &mut pax_path);
                entries.push(Entry {
                    name,
                    size,
                    mtime,
                    segments: Segments::Contiguous {
                        offset: data_start,
                        len: size as usize,
                    },
                });
                pos = data_start + padded(size);
            }
            // Old-style GNU sparse file.
            b'S' => {
                let (segments, real_size, data_pos) =
                    parse_sparse(buffer, header, data_start, size)?;
                let name = resolve_name(header, &mut longname, &mut pax_path);
                entries.push(Entry {
                    name,
                    size: real_size,
                    mtime,
                    segments: Segments::Sparse(segments),
                });
                pos = data_pos + padded(size);
            }
            // Directories, links, devices: consume and move on.
            _ => {
                payload(buffer, data_start, size)?;
                longname = None;
                pax_path = None;
                pos = data_start + padded(size);
            }
        }
    }

    Ok(entries)
}

/// A full header block at `pos`, or a parse error for a truncated one.
fn block(buffer: &[u8], pos: usize) -> Result<&[u8]> {
    buffer
        .get(pos..pos + BLOCK_LEN)
        .ok_or_else(|| Error::Parse("truncated tar header".to_string()))
}

/// An entry payload, bounds-checked against the buffer.
fn payload(buffer: &[u8], start: usize, size: u64) -> Result<&[u8]> {
    let len = usize::try_from(size)
        .map_err(|_| Error::Parse("tar entry size overflows".to_string()))?;
    buffer
        .get(start..start + len)
        .ok_or_else(|| Error::Parse("truncated tar entry".to_string()))
}

fn padded(size: u64) -> usize {
    let size = size as usize;
    size.div_ceil(BLOCK_LEN) * BLOCK_LEN
}

/// NUL/space-padded octal field.
fn parse_octal(field: &[u8]) -> Option<u64> {
    let mut i = 0;
    while i < field.len() && (field[i] == 0 || field[i] == b' ') {
        i += 1;
    }
    let mut end = i;
    while end < field.len() && (b'0'..=b'7').contains(&field[end]) {
        end += 1;
    }
    if end == i {
        return Some(0);
    }
    let mut value: u64 = 0;
    for &digit in &field[i..end] {
        value = value.checked_mul(8)?;
        value = value.checked_add((digit - b'0') as u64)?;
    }
    Some(value)
}

fn cstr(field: &[u8]) -> &[u8] {
    match field.iter().position(|&b| b == 0) {
        Some(i) => &field[..i],
        None => field,
    }
}

fn trim_name(bytes: &[u8]) -> &[u8] {
    let mut end = bytes.len();
    while end > 0 && (bytes[end - 1] == 0 || bytes[end - 1] == b'\n') {
        end -= 1;
    }
    &bytes[..end]
}

/// Entry name: PAX path wins over GNU longname wins over the header's
/// prefix+name fields. Overrides apply to exactly one entry.
fn resolve_name(
    header: &[u8],
    longname: &mut Option<String>,
    pax_path: &mut Option<String>,
) -> String {
    let from_header = || {
        let name = cstr(&header[0..100]);
        let is_ustar = &header[USTAR_MAGIC_OFFSET..USTAR_MAGIC_OFFSET + 5] == b"ustar";
        let prefix = if is_ustar {
            cstr(&header[PREFIX_OFFSET..PREFIX_OFFSET + 155])
        } else {
            &[][..]
        };
        if prefix.is_empty() {
            decode_lossy(name)
        } else {
            let mut full = decode_lossy(prefix);
            if !full.ends_with('/') {
                full.push('/');
            }
            full.push_str(&decode_lossy(name));
            full
        }
    };
    pax_path
        .take()
        .or_else(|| longname.take())
        .unwrap_or_else(from_header)
}

/// Extract the `path=` value from a PAX payload.
///
/// Records are `<len> <key>=<value>\n` where `<len>` counts the whole
/// record including its own digits. Malformed records end extraction.
fn parse_pax_path(payload: &[u8]) -> Option<String> {
    let mut pos = 0usize;
    while pos < payload.len() {
        let space = payload[pos..].iter().position(|&b| b == b' ')? + pos;
        let len: usize = std::str::from_utf8(&payload[pos..space])
            .ok()?
            .parse()
            .ok()?;
        if len == 0 || pos + len > payload.len() {
            return None;
        }
        let record = &payload[space + 1..pos + len];
        if let Some(eq) = record.iter().position(|&b| b == b'=') {
            let key = &record[..eq];
            let mut value = &record[eq + 1..];
            if value.last() == Some(&b'\n') {
                value = &value[..value.len() - 1];
            }
            if key == b"path" {
                return Some(decode_lossy(value));
            }
        }
        pos += len;
    }
    None
}

/// Decode an old-style GNU sparse map into buffer segments.
///
/// The header holds up to four (offset, numbytes) pairs; extension
/// blocks follow the header when the `isextended` flag is set, each
/// carrying 21 more pairs. Archived data runs are laid out back to back
/// after the map, so segment `i` starts where segment `i-1` ended.
/// Returns the segments, the real (expanded) file size, and the
/// position where archived data begins.
fn parse_sparse(
    buffer: &[u8],
    header: &[u8],
    data_start: usize,
    archived_size: u64,
) -> Result<(Vec<(usize, usize)>, u64, usize)> {
    let mut lengths: Vec<usize> = Vec::new();

    let mut read_pairs = |field: &[u8], count: usize| -> Result<()> {
        for i in 0..count {
            let pair = &field[i * 24..i * 24 + 24];
            let offset_field = &pair[0..12];
            if offset_field.iter().all(|&b| b == 0) {
                break;
            }
            let numbytes = parse_octal(&pair[12..24])
                .ok_or_else(|| Error::Parse("bad sparse map entry".to_string()))?;
            lengths.push(numbytes as usize);
        }
        Ok(())
    };

    read_pairs(&header[SPARSE_MAP_OFFSET..SPARSE_MAP_OFFSET + 4 * 24], 4)?;
    let real_size = parse_octal(&header[SPARSE_REALSIZE_OFFSET..SPARSE_REALSIZE_OFFSET + 12])
        .ok_or_else(|| Error::Parse("bad sparse real size".to_string()))?;

    let mut extended = header[SPARSE_EXTENDED_OFFSET] != 0;
    let mut pos = data_start;
    while extended {
        let ext = block(buffer, pos)?;
        read_pairs(&ext[0..21 * 24], 21)?;
        extended = ext[504] != 0;
        pos += BLOCK_LEN;
    }

    let mut segments = Vec::with_capacity(lengths.len());
    let mut cursor = pos;
    for len in lengths {
        segments.push((cursor, len));
        cursor += len;
    }
    if cursor - pos > archived_size as usize {
        return Err(Error::Parse(
            "sparse map larger than archived data".to_string(),
        ));
    }
    payload(buffer, pos, archived_size)?;

    Ok((segments, real_size, pos))
}

/// Tar fixture builders shared by this module's tests and the archive
/// tests one level up.
#[cfg(test)]
pub(crate) mod testutil {
    use super::{padded, BLOCK_LEN};

    /// Minimal ustar header writer, mirroring what a tar producer emits.
    pub(crate) fn write_header(buf: &mut [u8; BLOCK_LEN], name: &str, size: u64, typeflag: u8) {
        buf.fill(0);
        let name_bytes = name.as_bytes();
        let name_len = name_bytes.len().min(100);
        buf[0..name_len].copy_from_slice(&name_bytes[..name_len]);
        buf[100..108].copy_from_slice(b"0000644\0");
        buf[108..116].copy_from_slice(b"0000000\0");
        buf[116..124].copy_from_slice(b"0000000\0");
        write_octal(&mut buf[124..136], size);
        buf[136..148].copy_from_slice(b"14323356017\0"); // an mtime in 2021
        for b in &mut buf[148..156] {
            *b = b' ';
        }
        buf[156] = typeflag;
        buf[257..263].copy_from_slice(b"ustar\0");
        buf[263..265].copy_from_slice(b"00");
        let sum: u32 = buf.iter().map(|&b| b as u32).sum();
        let chk = format!("{sum:06o}\0 ");
        buf[148..156].copy_from_slice(chk.as_bytes());
    }

    pub(crate) fn write_octal(field: &mut [u8], value: u64) {
        let width = field.len() - 1;
        let mut v = value;
        for i in (0..width).rev() {
            field[i] = b'0' + ((v & 7) as u8);
            v >>= 3;
        }
        field[width] = 0;
    }

    pub(crate) fn push_entry(tar: &mut Vec<u8>, name: &str, payload: &[u8], typeflag: u8) {
        let mut hdr = [0u8; BLOCK_LEN];
        write_header(&mut hdr, name, payload.len() as u64, typeflag);
        tar.extend_from_slice(&hdr);
        tar.extend_from_slice(payload);
        tar.extend_from_slice(&vec![0u8; padded(payload.len() as u64) - payload.len()]);
    }

    pub(crate) fn finish_tar(tar: &mut Vec<u8>) {
        tar.extend_from_slice(&[0u8; BLOCK_LEN]);
        tar.extend_from_slice(&[0u8; BLOCK_LEN]);
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{finish_tar, push_entry, write_header, write_octal};
    use super::*;

    #[test]
    fn empty_buffer_has_no_entries() {
        assert!(parse(&[]).unwrap().is_empty());
    }

    #[test]
    fn regular_file_entry() {
        let mut tar = Vec::new();
        push_entry(&mut tar, "a.txt", b"hello\n", b'0');
        finish_tar(&mut tar);

        let entries = parse(&tar).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[0].size, 6);
        match entries[0].segments {
            Segments::Contiguous { offset, len } => {
                assert_eq!(&tar[offset..offset + len], b"hello\n");
            }
            _ => panic!("expected contiguous entry"),
        }
    }

    #[test]
    fn directories_and_symlinks_are_skipped() {
        let mut tar = Vec::new();
        push_entry(&mut tar, "dir/", &[], b'5');
        push_entry(&mut tar, "link", &[], b'2');
        push_entry(&mut tar, "dir/file", b"data", b'0');
        finish_tar(&mut tar);

        let entries = parse(&tar).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "dir/file");
    }

    #[test]
    fn pax_global_header_is_consumed() {
        // git archive leads with a pax_global_header carrying the commit id.
        let mut tar = Vec::new();
        push_entry(
            &mut tar,
            "pax_global_header",
            b"52 comment=aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n",
            b'g',
        );
        push_entry(&mut tar, "file.txt", b"x", b'0');
        finish_tar(&mut tar);

        let entries = parse(&tar).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "file.txt");
    }

    #[test]
    fn gnu_longname_overrides_next_entry() {
        let long = "dir/".repeat(30) + "file.txt";
        let mut name_payload = long.clone().into_bytes();
        name_payload.push(0);

        let mut tar = Vec::new();
        push_entry(&mut tar, "ignored", &name_payload, b'L');
        push_entry(&mut tar, "truncated-name", b"payload", b'0');
        push_entry(&mut tar, "second.txt", b"x", b'0');
        finish_tar(&mut tar);

        let entries = parse(&tar).unwrap();
        assert_eq!(entries[0].name, long);
        // The override applies to exactly one entry.
        assert_eq!(entries[1].name, "second.txt");
    }

    #[test]
    fn pax_path_wins_over_header_name() {
        let record = b"30 path=pax/override/name.txt\n";
        assert_eq!(record.len(), 30);

        let mut tar = Vec::new();
        push_entry(&mut tar, "PaxHeaders/x", record, b'x');
        push_entry(&mut tar, "header-name", b"payload", b'0');
        finish_tar(&mut tar);

        let entries = parse(&tar).unwrap();
        assert_eq!(entries[0].name, "pax/override/name.txt");
    }

    #[test]
    fn ustar_prefix_is_reassembled() {
        let mut hdr = [0u8; BLOCK_LEN];
        write_header(&mut hdr, "file.txt", 0, b'0');
        hdr[PREFIX_OFFSET..PREFIX_OFFSET + 8].copy_from_slice(b"deep/dir");

        let mut tar = Vec::new();
        tar.extend_from_slice(&hdr);
        finish_tar(&mut tar);

        let entries = parse(&tar).unwrap();
        assert_eq!(entries[0].name, "deep/dir/file.txt");
    }

    #[test]
    fn truncated_header_is_parse_error() {
        let tar = vec![1u8; 100];
        assert!(matches!(parse(&tar), Err(Error::Parse(_))));
    }

    #[test]
    fn truncated_payload_is_parse_error() {
        let mut hdr = [0u8; BLOCK_LEN];
        write_header(&mut hdr, "big.txt", 4096, b'0');
        let tar = hdr.to_vec(); // payload missing entirely
        assert!(matches!(parse(&tar), Err(Error::Parse(_))));
    }

    #[test]
    fn octal_fields() {
        assert_eq!(parse_octal(b"0000000010\0"), Some(8));
        assert_eq!(parse_octal(b"        \0"), Some(0));
        assert_eq!(parse_octal(b"\0\0\0\0"), Some(0));
    }

    #[test]
    fn sparse_entry_segments() {
        // Two data runs of 4 and 2 bytes; real size claims 1024.
        let mut hdr = [0u8; BLOCK_LEN];
        write_header(&mut hdr, "sparse.bin", 6, b'S');
        // map entry 0: offset 0, numbytes 4
        write_octal(&mut hdr[SPARSE_MAP_OFFSET..SPARSE_MAP_OFFSET + 12], 0);
        write_octal(&mut hdr[SPARSE_MAP_OFFSET + 12..SPARSE_MAP_OFFSET + 24], 4);
        // map entry 1: offset 512, numbytes 2
        write_octal(&mut hdr[SPARSE_MAP_OFFSET + 24..SPARSE_MAP_OFFSET + 36], 512);
        write_octal(&mut hdr[SPARSE_MAP_OFFSET + 36..SPARSE_MAP_OFFSET + 48], 2);
        write_octal(
            &mut hdr[SPARSE_REALSIZE_OFFSET..SPARSE_REALSIZE_OFFSET + 12],
            1024,
        );

        let mut tar = hdr.to_vec();
        tar.extend_from_slice(b"abcdxy");
        tar.extend_from_slice(&[0u8; BLOCK_LEN - 6]);
        finish_tar(&mut tar);

        let entries = parse(&tar).unwrap();
        assert_eq!(entries[0].size, 1024);
        match &entries[0].segments {
            Segments::Sparse(segments) => {
                assert_eq!(segments.len(), 2);
                let (off0, len0) = segments[0];
                let (off1, len1) = segments[1];
                assert_eq!(&tar[off0..off0 + len0], b"abcd");
                assert_eq!(&tar[off1..off1 + len1], b"xy");
            }
            _ => panic!("expected sparse entry"),
        }
    }
}
