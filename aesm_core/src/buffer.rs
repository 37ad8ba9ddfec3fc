//! Length prefixed byte containers used as request and response payload
//! fields.

use std::collections::TryReserveError;

use borsh::{
	io::{Error, ErrorKind, Read, Result as BorshResult, Write},
	BorshDeserialize, BorshSerialize,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Errors building a [`Buffer`].
#[derive(Debug)]
pub enum BufferError {
	/// The data does not fit the 32 bit length field.
	TooLarge(usize),
	/// Could not allocate memory for a copy of the data.
	OutOfMemory(TryReserveError),
}

impl From<TryReserveError> for BufferError {
	fn from(err: TryReserveError) -> Self {
		Self::OutOfMemory(err)
	}
}

/// An owned byte buffer with an explicit length field.
///
/// The length always equals the number of bytes held, so `length == 0` if and
/// only if the buffer is empty. A decoded buffer whose length field disagrees
/// with its data is rejected. Contents are zeroed when the buffer is dropped.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Buffer {
	length: u32,
	data: Vec<u8>,
}

impl Buffer {
	/// Take ownership of `data`.
	pub fn from_vec(mut data: Vec<u8>) -> Result<Self, BufferError> {
		match u32::try_from(data.len()) {
			Ok(length) => Ok(Self { length, data }),
			Err(_) => {
				let len = data.len();
				data.zeroize();
				Err(BufferError::TooLarge(len))
			}
		}
	}

	/// Make a defensive copy of `data`. Allocation failure is reported
	/// instead of aborting the process.
	pub fn copy_from_slice(data: &[u8]) -> Result<Self, BufferError> {
		let length = u32::try_from(data.len())
			.map_err(|_| BufferError::TooLarge(data.len()))?;

		let mut copy = Vec::new();
		copy.try_reserve_exact(data.len())?;
		copy.extend_from_slice(data);

		Ok(Self { length, data: copy })
	}

	/// Length as carried on the wire.
	#[must_use]
	pub fn length(&self) -> u32 {
		self.length
	}

	/// Number of bytes held.
	#[must_use]
	pub fn len(&self) -> usize {
		self.data.len()
	}

	/// True if the buffer holds no bytes.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	/// Borrow the contents.
	#[must_use]
	pub fn as_slice(&self) -> &[u8] {
		&self.data
	}

	/// Copy the contents into the front of `dest`.
	///
	/// Returns `None`, and leaves `dest` untouched, if `dest` is smaller than
	/// this buffer. Otherwise returns the number of bytes written.
	#[must_use]
	pub fn copy_to(&self, dest: &mut [u8]) -> Option<usize> {
		let len = self.data.len();
		let dest = dest.get_mut(..len)?;
		dest.copy_from_slice(&self.data);

		Some(len)
	}
}

impl std::fmt::Debug for Buffer {
	// Never print contents, they may be secret.
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Buffer").field("length", &self.length).finish()
	}
}

impl BorshSerialize for Buffer {
	fn serialize<W: Write>(&self, writer: &mut W) -> BorshResult<()> {
		self.length.serialize(writer)?;
		self.data.serialize(writer)
	}
}

impl BorshDeserialize for Buffer {
	fn deserialize_reader<R: Read>(reader: &mut R) -> BorshResult<Self> {
		let length = u32::deserialize_reader(reader)?;
		let data = Vec::<u8>::deserialize_reader(reader)?;

		// Construct first so the data is zeroed even when we reject it.
		let buffer = Self { length, data };
		if usize::try_from(buffer.length).ok() != Some(buffer.data.len()) {
			return Err(Error::new(
				ErrorKind::InvalidData,
				"buffer length field does not match its data",
			));
		}

		Ok(buffer)
	}
}

/// Copy `data` into an optional buffer; an empty slice means "absent".
pub(crate) fn copy_optional(
	data: &[u8],
) -> Result<Option<Buffer>, BufferError> {
	if data.is_empty() {
		Ok(None)
	} else {
		Buffer::copy_from_slice(data).map(Some)
	}
}

/// Length of an optional buffer, for ceiling accounting.
pub(crate) fn optional_len(buffer: Option<&Buffer>) -> u64 {
	buffer.map_or(0, |b| u64::from(b.length()))
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn length_tracks_data() {
		let buffer = Buffer::copy_from_slice(&[1, 2, 3]).unwrap();
		assert_eq!(buffer.length(), 3);
		assert_eq!(buffer.len(), 3);
		assert_eq!(buffer.as_slice(), &[1, 2, 3]);

		let empty = Buffer::from_vec(vec![]).unwrap();
		assert_eq!(empty.length(), 0);
		assert!(empty.is_empty());
	}

	#[test]
	fn copy_to_refuses_small_destination() {
		let buffer = Buffer::copy_from_slice(&[9; 8]).unwrap();

		let mut small = [0u8; 7];
		assert_eq!(buffer.copy_to(&mut small), None);
		assert_eq!(small, [0u8; 7]);

		let mut big = [0u8; 10];
		assert_eq!(buffer.copy_to(&mut big), Some(8));
		assert_eq!(&big[..8], &[9; 8]);
		assert_eq!(&big[8..], &[0, 0]);
	}

	#[test]
	fn decode_rejects_mismatched_length() {
		// length field says 4, data holds 2 bytes
		let mut bytes = borsh::to_vec(&4u32).unwrap();
		bytes.extend(borsh::to_vec(&vec![1u8, 2]).unwrap());
		assert!(Buffer::try_from_slice(&bytes).is_err());

		// length field says 0, data holds 1 byte
		let mut bytes = borsh::to_vec(&0u32).unwrap();
		bytes.extend(borsh::to_vec(&vec![1u8]).unwrap());
		assert!(Buffer::try_from_slice(&bytes).is_err());

		let good = Buffer::copy_from_slice(&[5, 6]).unwrap();
		let decoded =
			Buffer::try_from_slice(&borsh::to_vec(&good).unwrap()).unwrap();
		assert_eq!(decoded, good);
	}

	#[test]
	fn debug_does_not_leak_contents() {
		let buffer = Buffer::copy_from_slice(b"secret").unwrap();
		let printed = format!("{buffer:?}");
		assert!(!printed.contains("115"));
		assert!(printed.contains("length: 6"));
	}

	#[test]
	fn empty_slice_is_absent() {
		assert!(copy_optional(&[]).unwrap().is_none());
		let some = copy_optional(&[1]).unwrap();
		assert_eq!(optional_len(some.as_ref()), 1);
	}
}
