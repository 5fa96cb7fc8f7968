// Diffie-Hellman key exchange for the complex handshake

use num_bigint::BigUint;
use rand::{rngs::StdRng, RngCore, SeedableRng};

/// RFC 2409 1024-bit MODP prime (second Oakley group), used by the
/// RTMP complex handshake
const DH_PRIME_1024_HEX: &str = "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE65381\
FFFFFFFFFFFFFFFF";

/// Public / shared key size in bytes
pub const DH_KEY_SIZE: usize = 128;

/// A generated 1024-bit Diffie-Hellman key pair
pub struct DhKeyExchange {
    prime: BigUint,
    private_key: BigUint,
    public_key: BigUint,
}

impl DhKeyExchange {
    /// Generates a key pair, regenerating until the public key is exactly
    /// 128 bytes (a smaller one breaks the fixed key block layout)
    pub fn new() -> DhKeyExchange {
        let prime = BigUint::parse_bytes(DH_PRIME_1024_HEX.as_bytes(), 16)
            .expect("the DH prime constant is valid hex");
        let generator = BigUint::from(2u32);

        let mut rng = StdRng::from_os_rng();

        loop {
            let mut private_bytes = vec![0u8; DH_KEY_SIZE];
            rng.fill_bytes(&mut private_bytes);

            let private_key = BigUint::from_bytes_be(&private_bytes) % &prime;
            let public_key = generator.modpow(&private_key, &prime);

            if public_key.to_bytes_be().len() == DH_KEY_SIZE {
                return DhKeyExchange {
                    prime,
                    private_key,
                    public_key,
                };
            }
        }
    }

    /// Gets the public key as exactly 128 bytes
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.to_bytes_be()
    }

    /// Computes the shared secret from the peer's public key,
    /// left-padded to 128 bytes
    pub fn shared_secret(&self, peer_public: &[u8]) -> Vec<u8> {
        let peer = BigUint::from_bytes_be(peer_public);
        let shared = peer.modpow(&self.private_key, &self.prime);

        let raw = shared.to_bytes_be();

        let mut out = vec![0u8; DH_KEY_SIZE];
        let start = DH_KEY_SIZE.saturating_sub(raw.len());
        let copy_len = raw.len().min(DH_KEY_SIZE);
        out[start..].copy_from_slice(&raw[raw.len() - copy_len..]);

        out
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_is_128_bytes() {
        let dh = DhKeyExchange::new();
        assert_eq!(dh.public_key_bytes().len(), DH_KEY_SIZE);
    }

    #[test]
    fn test_shared_secret_agreement() {
        let alice = DhKeyExchange::new();
        let bob = DhKeyExchange::new();

        let secret_a = alice.shared_secret(&bob.public_key_bytes());
        let secret_b = bob.shared_secret(&alice.public_key_bytes());

        assert_eq!(secret_a, secret_b);
        assert_eq!(secret_a.len(), DH_KEY_SIZE);
    }
}
