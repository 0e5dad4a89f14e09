/// GF(2^8) arithmetic with primitive polynomial 0x11D and generator 2.
///
/// The exp table is doubled (510 entries) so multiplication never takes
/// a modulus: log[a] + log[b] <= 508 stays in range.
const PRIMITIVE_POLY: u16 = 0x11D;

const fn build_tables() -> ([u8; 510], [u8; 256]) {
    let mut exp = [0u8; 510];
    let mut log = [0u8; 256];
    let mut x: u16 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x as u8;
        exp[i + 255] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= PRIMITIVE_POLY;
        }
        i += 1;
    }
    (exp, log)
}

static TABLES: ([u8; 510], [u8; 256]) = build_tables();

/// alpha^i for arbitrary i (reduced mod 255).
pub fn exp(i: usize) -> u8 {
    TABLES.0[i % 255]
}

/// Discrete log of a nonzero element.
pub fn log(a: u8) -> u8 {
    debug_assert!(a != 0, "log of zero in GF(2^8)");
    TABLES.1[a as usize]
}

/// Addition in GF(2^8) is XOR.
#[inline]
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Multiplication via the doubled exp table.
pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let (exp, log) = (&TABLES.0, &TABLES.1);
    exp[log[a as usize] as usize + log[b as usize] as usize]
}

/// Division; panics on a zero divisor (a caller bug, not a data error).
pub fn div(a: u8, b: u8) -> u8 {
    assert!(b != 0, "division by zero in GF(2^8)");
    if a == 0 {
        return 0;
    }
    let (exp, log) = (&TABLES.0, &TABLES.1);
    exp[(log[a as usize] as usize + 255 - log[b as usize] as usize) % 255]
}

/// Multiplicative inverse of a nonzero element.
pub fn inv(a: u8) -> u8 {
    div(1, a)
}
