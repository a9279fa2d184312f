//! Encoding of nucleotide sequences into the small integer alphabet used for score lookups.

pub const A_NT: u8 = 0;
pub const C_NT: u8 = 1;
pub const G_NT: u8 = 2;
pub const T_NT: u8 = 3;
/// Soft-masked (lowercase) base
pub const L_NT: u8 = 4;
pub const N_NT: u8 = 5;
/// Any other, unrecognized symbol
pub const X_NT: u8 = 6;
/// Sequence terminator
pub const E_NT: u8 = 7;

/// Number of symbols in the nucleotide alphabet
pub const NUC: usize = 8;
pub const NUC2: usize = NUC * NUC;

const fn build_encoding_table() -> [u8; 256] {
    let mut table = [X_NT; 256];

    table[b'A' as usize] = A_NT;
    table[b'C' as usize] = C_NT;
    table[b'G' as usize] = G_NT;
    table[b'T' as usize] = T_NT;
    table[b'a' as usize] = L_NT;
    table[b'c' as usize] = L_NT;
    table[b'g' as usize] = L_NT;
    table[b't' as usize] = L_NT;
    table[b'N' as usize] = N_NT;
    table[b'n' as usize] = N_NT;
    table[b'&' as usize] = E_NT;

    table
}

static ENCODING: [u8; 256] = build_encoding_table();

#[inline(always)]
pub fn encode_symbol(symbol: u8) -> u8 {
    ENCODING[symbol as usize]
}

/// Encode `src` into `dst`. Both slices are expected to have the same length, extra positions
/// in the longer of the two are left untouched.
pub fn encode_sequence(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d = encode_symbol(*s);
    }
}

pub fn encode(src: &[u8]) -> Vec<u8> {
    src.iter().map(|s| encode_symbol(*s)).collect()
}

/// Printable representation of an encoded symbol. Soft-masked bases lost their identity during
/// encoding and are shown as `l`.
pub fn decode_symbol(code: u8) -> u8 {
    match code {
        A_NT => b'A',
        C_NT => b'C',
        G_NT => b'G',
        T_NT => b'T',
        L_NT => b'l',
        N_NT => b'N',
        E_NT => b'&',
        _ => b'X',
    }
}

/// Whether the code represents one of the four unambiguous bases.
#[inline(always)]
pub fn is_base(code: u8) -> bool {
    code <= T_NT
}
