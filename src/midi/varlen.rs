use crate::error::{Result, SequencerError};

/// Largest value a 4-byte variable-length quantity can carry.
pub const MAX_VAR_LEN: u32 = 0x0FFF_FFFF;

const MAX_VAR_LEN_BYTES: usize = 4;

/// Reads a big-endian base-128 quantity starting at `offset`.
///
/// Returns the decoded value and the number of bytes it occupied.
pub fn read_var_len(bytes: &[u8], offset: usize) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    let mut consumed = 0;

    loop {
        let Some(&byte) = bytes.get(offset + consumed) else {
            return Err(SequencerError::MalformedVarLen { offset });
        };

        value = (value << 7) | (byte & 0x7F) as u32;
        consumed += 1;

        if byte & 0x80 == 0 {
            return Ok((value, consumed));
        }

        if consumed == MAX_VAR_LEN_BYTES {
            return Err(SequencerError::MalformedVarLen { offset });
        }
    }
}

/// Encodes `value` using the minimal number of 7-bit groups.
pub fn write_var_len(value: u32) -> Result<Vec<u8>> {
    if value > MAX_VAR_LEN {
        return Err(SequencerError::VarLenOutOfRange(value));
    }

    let mut groups = vec![(value & 0x7F) as u8];
    let mut rest = value >> 7;
    while rest > 0 {
        groups.push(((rest & 0x7F) as u8) | 0x80);
        rest >>= 7;
    }
    groups.reverse();

    Ok(groups)
}
