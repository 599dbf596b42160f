//! Deterministic visitor bucketing
//!
//! Hashes `visitor_id ++ salt` with MurmurHash3 (x86, 32-bit) and reduces
//! the result into `[0, BUCKET_RANGE)`. The salt is the flag key, so the same
//! visitor lands in independent buckets for different flags.

use crate::domain::types::{VisitorId, BUCKET_RANGE};
use crate::error::{Result, SorterError};

/// Hash seed shared by every bucketing call
const HASH_SEED: u32 = 1;

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

#[inline]
fn mix_k(k: u32) -> u32 {
    k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// MurmurHash3 x86_32
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut h = seed;

    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h ^= mix_k(k);
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let k = tail
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, &byte)| acc | (u32::from(byte) << (8 * i)));
        h ^= mix_k(k);
    }

    // Length is folded in modulo 2^32, as in the reference implementation
    h ^= data.len() as u32;
    fmix32(h)
}

/// Map a visitor into the bucket space for one flag
pub fn bucket(visitor_id: &VisitorId, salt: &str) -> Result<u32> {
    if visitor_id.as_str().trim().is_empty() {
        return Err(SorterError::InvalidInput {
            salt: salt.to_string(),
            reason: "visitor id is empty".to_string(),
        });
    }

    let mut key = String::with_capacity(visitor_id.as_str().len() + salt.len());
    key.push_str(visitor_id.as_str());
    key.push_str(salt);

    Ok(murmur3_32(key.as_bytes(), HASH_SEED) % BUCKET_RANGE)
}
