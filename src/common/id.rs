//! Kademlia peer Id or a lookup target key.
use rand::Rng;
use std::fmt::{self, Debug, Formatter};

use crate::error::Error;

/// The size of ids in bytes.
pub const ID_SIZE: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
/// Kademlia peer Id or a lookup target key.
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    pub fn random() -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; ID_SIZE] = rng.gen();

        Id(random_bytes)
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id, Error> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(Error::InvalidIdSize(bytes.len()));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp[..ID_SIZE].clone_from_slice(&bytes[..ID_SIZE]);

        Ok(Id(tmp))
    }

    /// XOR distance between this Id and a target.
    ///
    /// The derived `Ord` on the result is big-endian lexicographic, which is
    /// the numeric order of the xor metric, so distances form a stable total
    /// order. Distance to self is all zeros.
    pub fn xor(&self, other: &Id) -> Id {
        let mut result = [0u8; ID_SIZE];

        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }

        Id(result)
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({:x?})", &self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_wrong_size() {
        assert_eq!(Id::from_bytes([0u8; 7]), Err(Error::InvalidIdSize(7)));
    }

    #[test]
    fn xor_is_a_distance() {
        let a = Id::random();
        let b = Id::random();

        assert_eq!(a.xor(&a), Id([0; ID_SIZE]));
        assert_eq!(a.xor(&b), b.xor(&a));
    }

    #[test]
    fn xor_orders_by_closeness() {
        let target = Id([0; ID_SIZE]);

        let mut near = [0u8; ID_SIZE];
        near[ID_SIZE - 1] = 1;
        let mut far = [0u8; ID_SIZE];
        far[0] = 1;

        assert!(Id(near).xor(&target) < Id(far).xor(&target));
    }
}
