//! Structural helpers for raw BAM records.
//!
//! Records are the payloads between length prefixes; they start at `refID`
//! (the 4-byte `block_size` prefix is not included). Only the fixed 32-byte
//! section, read name, CIGAR, sequence and quality extents are inspected.
//! Field semantics are left to the consumer.

/// Size of the fixed-length section of a BAM record.
pub const MIN_BAM_RECORD_LEN: usize = 32;

/// Extract `l_read_name` (length of read name + NUL) from a BAM record.
///
/// Returns `0` for records too short to hold the field.
#[inline]
#[must_use]
pub fn l_read_name(bam: &[u8]) -> usize {
    bam.get(8).map_or(0, |&l| l as usize)
}

/// Extract the read name (without the NUL terminator) from a BAM record.
///
/// Returns an empty slice if the record is too short to contain its name,
/// so the function can serve as a grouping key for arbitrary payloads.
#[inline]
#[must_use]
pub fn read_name(bam: &[u8]) -> &[u8] {
    let l = l_read_name(bam);
    if l > 1 && bam.len() >= MIN_BAM_RECORD_LEN + l {
        &bam[MIN_BAM_RECORD_LEN..MIN_BAM_RECORD_LEN + l - 1]
    } else {
        &[]
    }
}

/// Whether two records share a read name. The standard run predicate for
/// name-grouped input.
#[inline]
#[must_use]
pub fn same_read_name(a: &[u8], b: &[u8]) -> bool {
    read_name(a) == read_name(b)
}

/// Offset of the auxiliary data, i.e. the end of the mandatory fields.
///
/// `32 + l_read_name + n_cigar_op*4 + (l_seq+1)/2 + l_seq`
#[inline]
#[must_use]
pub fn aux_data_offset(bam: &[u8]) -> Option<usize> {
    if bam.len() < MIN_BAM_RECORD_LEN {
        return None;
    }
    let l_rn = bam[8] as usize;
    let n_co = u16::from_le_bytes([bam[12], bam[13]]) as usize;
    let l_s = u32::from_le_bytes([bam[16], bam[17], bam[18], bam[19]]) as usize;
    Some(MIN_BAM_RECORD_LEN + l_rn + n_co * 4 + l_s.div_ceil(2) + l_s)
}

/// Whether a read name byte is allowed (`[!-?A-~]`).
#[inline]
fn is_name_byte(b: u8) -> bool {
    matches!(b, b'!'..=b'?' | b'A'..=b'~')
}

/// Check that a record is structurally well formed.
///
/// Requires the fixed section, a NUL-terminated read name of legal
/// characters, and CIGAR/sequence/quality extents that fit in the record.
/// Auxiliary fields are not inspected.
#[must_use]
pub fn is_structurally_valid(bam: &[u8]) -> bool {
    let Some(end) = aux_data_offset(bam) else {
        return false;
    };
    if end > bam.len() {
        return false;
    }
    let l = l_read_name(bam);
    if l == 0 || bam[MIN_BAM_RECORD_LEN + l - 1] != 0 {
        return false;
    }
    bam[MIN_BAM_RECORD_LEN..MIN_BAM_RECORD_LEN + l - 1].iter().all(|&b| is_name_byte(b))
}

/// Build a minimal unmapped BAM record with the given read name, sequence
/// length and auxiliary bytes. Used by tests and benchmarks.
#[must_use]
pub fn build_unmapped_record(name: &[u8], l_seq: usize, aux: &[u8]) -> Vec<u8> {
    let l_read_name = name.len() + 1;
    let mut bam = Vec::with_capacity(MIN_BAM_RECORD_LEN + l_read_name + l_seq * 2 + aux.len());
    bam.extend_from_slice(&(-1i32).to_le_bytes()); // refID
    bam.extend_from_slice(&(-1i32).to_le_bytes()); // pos
    bam.push(u8::try_from(l_read_name).unwrap_or(u8::MAX));
    bam.push(255); // mapq
    bam.extend_from_slice(&4680u16.to_le_bytes()); // bin
    bam.extend_from_slice(&0u16.to_le_bytes()); // n_cigar_op
    bam.extend_from_slice(&4u16.to_le_bytes()); // flag: unmapped
    bam.extend_from_slice(&u32::try_from(l_seq).unwrap_or(u32::MAX).to_le_bytes());
    bam.extend_from_slice(&(-1i32).to_le_bytes()); // next refID
    bam.extend_from_slice(&(-1i32).to_le_bytes()); // next pos
    bam.extend_from_slice(&0i32.to_le_bytes()); // tlen
    bam.extend_from_slice(name);
    bam.push(0);
    bam.extend(std::iter::repeat_n(0x11, l_seq.div_ceil(2))); // all A
    bam.extend(std::iter::repeat_n(30, l_seq));
    bam.extend_from_slice(aux);
    bam
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_read_name() {
        let bam = build_unmapped_record(b"read:1", 4, b"");
        assert_eq!(read_name(&bam), b"read:1");
        assert_eq!(l_read_name(&bam), 7);
    }

    #[test]
    fn test_same_read_name() {
        let a = build_unmapped_record(b"pair", 4, b"");
        let b = build_unmapped_record(b"pair", 9, b"NMC\x01");
        let c = build_unmapped_record(b"other", 4, b"");
        assert!(same_read_name(&a, &b));
        assert!(!same_read_name(&a, &c));
    }

    #[rstest]
    #[case::empty(&[])]
    #[case::short(&[0u8; 10])]
    #[case::fixed_section_only(&[0u8; 32])]
    fn test_read_name_of_short_payload(#[case] bam: &[u8]) {
        assert!(read_name(bam).is_empty());
    }

    #[test]
    fn test_aux_data_offset() {
        let bam = build_unmapped_record(b"q", 5, b"XYZ");
        // 32 + 2 + 0 + 3 + 5
        assert_eq!(aux_data_offset(&bam), Some(42));
        assert_eq!(bam.len(), 45);
    }

    #[test]
    fn test_valid_record() {
        let bam = build_unmapped_record(b"frag/1", 10, b"RGZgrp\0");
        assert!(is_structurally_valid(&bam));
    }

    #[test]
    fn test_truncated_record_is_invalid() {
        let bam = build_unmapped_record(b"frag", 10, b"");
        assert!(!is_structurally_valid(&bam[..bam.len() - 1]));
        assert!(!is_structurally_valid(&bam[..20]));
    }

    #[test]
    fn test_missing_nul_is_invalid() {
        let mut bam = build_unmapped_record(b"frag", 0, b"");
        let nul_at = MIN_BAM_RECORD_LEN + 4;
        bam[nul_at] = b'x';
        assert!(!is_structurally_valid(&bam));
    }

    #[test]
    fn test_illegal_name_character_is_invalid() {
        let bam = build_unmapped_record(b"bad@name", 0, b"");
        assert!(!is_structurally_valid(&bam));
    }

    #[test]
    fn test_zero_l_read_name_is_invalid() {
        let mut bam = build_unmapped_record(b"x", 0, b"");
        bam[8] = 0;
        assert!(!is_structurally_valid(&bam));
    }
}
