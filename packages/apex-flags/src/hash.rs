//! Platform-stable bucketing hash. `DefaultHasher` is not guaranteed stable
//! across releases, and rollout buckets must not move when the binary is
//! rebuilt, so this is FNV-1a with a SplitMix64 finalizer.

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub fn stable_hash(parts: &[&str]) -> u64 {
	let mut h = FNV_OFFSET;

	for part in parts {
		for byte in part.as_bytes() {
			h ^= *byte as u64;
			h = h.wrapping_mul(FNV_PRIME);
		}

		// Separator so ("ab", "c") and ("a", "bc") hash apart.
		h ^= 0xff;
		h = h.wrapping_mul(FNV_PRIME);
	}

	splitmix64(h)
}

/// Bucket in `0..100` for a user under a flag.
pub fn rollout_bucket(user_id: &str, flag_name: &str) -> u8 {
	(stable_hash(&[user_id, flag_name]) % 100) as u8
}

fn splitmix64(mut x: u64) -> u64 {
	x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
	x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
	x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);

	x ^ (x >> 31)
}
