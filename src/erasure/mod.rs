/// Reed-Solomon erasure codec over GF(2^8).
///
/// Parity uses a Vandermonde-like generator pinned for cross-implementation
/// interop: parity shard p, byte j is
///
///   XOR over data shards i of  mul(data[i][j], coef(p, i))
///
/// with coef(p, i) = alpha^((p+1)*(i+1) mod 255). Decoding solves the
/// resulting linear system exactly; any D of the D+P shards recover the
/// original buffer.
pub mod gf256;

use crate::error::{MystError, Result};
use crate::partition;

/// Default parity ratio: P = ceil(D * 0.4).
pub fn parity_count(data_shards: usize) -> usize {
    (data_shards * 2).div_ceil(5)
}

/// Generator coefficient for parity row `p`, data column `i`.
fn coefficient(p: usize, i: usize) -> u8 {
    gf256::exp((p + 1) * (i + 1))
}

/// Encode a buffer into `data_shards + parity_shards` equal-length shards.
///
/// Data shards are the ceiling-chunk split of the input, right-padded
/// with zeros to S = ceil(len / data_shards). The pad survives decoding;
/// the master AEAD layer recovers the exact plaintext length.
pub fn encode(data: &[u8], data_shards: usize, parity_shards: usize) -> Vec<Vec<u8>> {
    assert!(data_shards > 0, "data shard count must be positive");

    let shard_len = data.len().div_ceil(data_shards);
    let mut shards = partition::split(data, data_shards);
    for shard in &mut shards {
        shard.resize(shard_len, 0);
    }

    let mut parity = Vec::with_capacity(parity_shards);
    for p in 0..parity_shards {
        let mut row = vec![0u8; shard_len];
        for (i, shard) in shards.iter().enumerate() {
            let c = coefficient(p, i);
            for j in 0..shard_len {
                row[j] ^= gf256::mul(shard[j], c);
            }
        }
        parity.push(row);
    }
    shards.extend(parity);
    shards
}

/// Decode a sparse shard array back into the original D*S buffer.
///
/// Missing positions are `None`. Trailing zero padding is not stripped.
pub fn decode(
    shards: &[Option<Vec<u8>>],
    data_shards: usize,
    parity_shards: usize,
) -> Result<Vec<u8>> {
    assert_eq!(
        shards.len(),
        data_shards + parity_shards,
        "shard array length must be D+P"
    );

    let have = shards.iter().filter(|s| s.is_some()).count();

    // Fast path: every data shard survived.
    if shards[..data_shards].iter().all(Option::is_some) {
        let mut out = Vec::new();
        for shard in shards[..data_shards].iter().flatten() {
            out.extend_from_slice(shard);
        }
        return Ok(out);
    }

    if have < data_shards {
        return Err(MystError::InsufficientShards {
            have,
            need: data_shards,
        });
    }

    let shard_len = shards.iter().flatten().map(Vec::len).next().unwrap_or(0);
    if shards.iter().flatten().any(|s| s.len() != shard_len) {
        return Err(MystError::Serialization(
            "erasure shards have mismatched lengths".to_string(),
        ));
    }

    let missing: Vec<usize> = (0..data_shards).filter(|&i| shards[i].is_none()).collect();
    let avail_parity: Vec<usize> = (0..parity_shards)
        .filter(|&p| shards[data_shards + p].is_some())
        .collect();

    if avail_parity.len() < missing.len() {
        return Err(MystError::InsufficientShards {
            have,
            need: data_shards,
        });
    }

    // One equation per surviving parity shard. The right-hand side is the
    // parity bytes with every known data contribution folded out, leaving
    // only the missing unknowns.
    let m = missing.len();
    let mut coeffs: Vec<Vec<u8>> = Vec::with_capacity(avail_parity.len());
    let mut rhs: Vec<Vec<u8>> = Vec::with_capacity(avail_parity.len());

    for &p in &avail_parity {
        let parity = shards[data_shards + p].as_ref().unwrap();
        let row: Vec<u8> = missing.iter().map(|&i| coefficient(p, i)).collect();

        let mut b = parity.clone();
        for (i, shard) in shards[..data_shards].iter().enumerate() {
            if let Some(shard) = shard {
                let c = coefficient(p, i);
                for j in 0..shard_len {
                    b[j] ^= gf256::mul(shard[j], c);
                }
            }
        }
        coeffs.push(row);
        rhs.push(b);
    }

    // Gauss-Jordan elimination over GF(2^8). The system must reach full
    // rank m; anything less means the surviving shards cannot pin down
    // the missing ones.
    let rows = coeffs.len();
    let mut pivot = 0usize;
    for col in 0..m {
        let Some(r) = (pivot..rows).find(|&r| coeffs[r][col] != 0) else {
            return Err(MystError::InsufficientShards {
                have,
                need: data_shards,
            });
        };
        coeffs.swap(pivot, r);
        rhs.swap(pivot, r);

        let inv = gf256::inv(coeffs[pivot][col]);
        for c in col..m {
            coeffs[pivot][c] = gf256::mul(coeffs[pivot][c], inv);
        }
        for j in 0..shard_len {
            rhs[pivot][j] = gf256::mul(rhs[pivot][j], inv);
        }

        let prow = coeffs[pivot].clone();
        let prhs = rhs[pivot].clone();
        for r2 in 0..rows {
            if r2 == pivot || coeffs[r2][col] == 0 {
                continue;
            }
            let f = coeffs[r2][col];
            for c in col..m {
                coeffs[r2][c] ^= gf256::mul(prow[c], f);
            }
            for j in 0..shard_len {
                rhs[r2][j] ^= gf256::mul(prhs[j], f);
            }
        }
        pivot += 1;
    }

    // Row k of the reduced system is the byte vector of missing[k].
    let mut out = Vec::with_capacity(data_shards * shard_len);
    for i in 0..data_shards {
        match &shards[i] {
            Some(shard) => out.extend_from_slice(shard),
            None => {
                let k = missing.iter().position(|&x| x == i).unwrap();
                out.extend_from_slice(&rhs[k]);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 + 7) as u8).collect()
    }

    #[test]
    fn test_parity_count_default_ratio() {
        assert_eq!(parity_count(10), 4);
        assert_eq!(parity_count(5), 2);
        assert_eq!(parity_count(3), 2);
        assert_eq!(parity_count(2), 1);
    }

    #[test]
    fn test_encode_shard_geometry() {
        let data = sample(103);
        let shards = encode(&data, 10, 4);
        assert_eq!(shards.len(), 14);
        // ceil(103/10) = 11, every shard identical length
        assert!(shards.iter().all(|s| s.len() == 11));
    }

    #[test]
    fn test_decode_all_data_present() {
        let data = sample(100);
        let shards = encode(&data, 10, 4);
        let sparse: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        let decoded = decode(&sparse, 10, 4).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_recover_single_missing_data_shard() {
        let data = sample(1000);
        let shards = encode(&data, 10, 4);
        let mut sparse: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        sparse[3] = None;

        let decoded = decode(&sparse, 10, 4).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_recover_maximum_losses() {
        // D=10, P=4: any 4 losses are recoverable
        let data = sample(4096);
        let shards = encode(&data, 10, 4);
        let mut sparse: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        sparse[0] = None;
        sparse[5] = None;
        sparse[9] = None;
        sparse[11] = None; // one parity loss too

        let decoded = decode(&sparse, 10, 4).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_padding_survives_roundtrip() {
        // 11 bytes over 4 shards pads the last shard with one zero
        let data = sample(11);
        let shards = encode(&data, 4, 2);
        assert!(shards.iter().all(|s| s.len() == 3));

        let mut sparse: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        sparse[1] = None;
        let decoded = decode(&sparse, 4, 2).unwrap();
        assert_eq!(decoded.len(), 12);
        assert_eq!(&decoded[..11], &data[..]);
        assert_eq!(decoded[11], 0);
    }

    #[test]
    fn test_insufficient_shards_fails_with_counts() {
        let data = sample(1000);
        let shards = encode(&data, 10, 4);
        let mut sparse: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        // drop 5 of 14: 9 remain, 10 needed
        for i in [0, 2, 4, 6, 8] {
            sparse[i] = None;
        }

        match decode(&sparse, 10, 4) {
            Err(MystError::InsufficientShards { have, need }) => {
                assert_eq!(have, 9);
                assert_eq!(need, 10);
            }
            other => panic!("expected InsufficientShards, got {other:?}"),
        }
    }

    #[test]
    fn test_parity_only_reconstruction() {
        // Lose data shards up to the parity budget, keep all parity
        let data = sample(300);
        let shards = encode(&data, 5, 2);
        let mut sparse: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        sparse[1] = None;
        sparse[4] = None;

        let decoded = decode(&sparse, 5, 2).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_empty_input() {
        let shards = encode(&[], 4, 2);
        assert_eq!(shards.len(), 6);
        assert!(shards.iter().all(Vec::is_empty));

        let sparse: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        assert!(decode(&sparse, 4, 2).unwrap().is_empty());
    }

    #[test]
    fn test_known_parity_bytes() {
        // Pin the generator: with one data shard [x], parity p is
        // mul(x, alpha^(p+1)).
        let shards = encode(&[0x53], 1, 2);
        assert_eq!(shards[0], vec![0x53]);
        assert_eq!(shards[1], vec![gf256::mul(0x53, gf256::exp(1))]);
        assert_eq!(shards[2], vec![gf256::mul(0x53, gf256::exp(2))]);
    }
}
