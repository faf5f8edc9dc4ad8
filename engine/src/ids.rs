//! Identifier minting: transaction ids and replica uids.
//!
//! Neither the original spec nor this crate ever derives ordering from
//! the contents of these tokens — they are opaque and compared only
//! for equality (§3, Transaction Log Entry; §9, replica_uid caching).

use rand::Rng;

/// A fresh, locally-unique transaction id: `"T-" + 16 lowercase hex`.
pub fn new_transaction_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    let mut id = String::with_capacity(18);
    id.push_str("T-");
    for b in bytes {
        id.push_str(&format!("{b:02x}"));
    }
    id
}

/// A fresh replica identity, minted the first time a backend is opened
/// with no stored identity row.
pub fn new_replica_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
