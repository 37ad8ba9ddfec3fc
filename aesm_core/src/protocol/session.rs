//! Open platform service sessions.
//!
//! A session id is valid from the `CreateSession` that returned it until the
//! `CloseSession` that names it, or until the connection that created it
//! drops. Any later reference fails with `SESSION_INVALID`.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};

use rand::Rng;

use crate::{
	buffer::Buffer,
	server::ConnectionId,
	status::{AesmResult, ServiceStatus},
};

use super::LogicResult;

/// Number of leading bytes of a PSE message that carry the session id, little
/// endian.
pub const SESSION_ID_LEN: usize = 4;

const POISONED: ServiceStatus =
	ServiceStatus::failure(AesmResult::UNEXPECTED_ERROR);
const INVALID: ServiceStatus =
	ServiceStatus::failure(AesmResult::SESSION_INVALID);

/// State of one open session.
#[derive(Debug)]
pub struct Session {
	material: Buffer,
	closed: bool,
}

impl Session {
	/// Key material of the session, as handed out by the logic.
	#[must_use]
	pub fn material(&self) -> &Buffer {
		&self.material
	}

	/// Replace the key material. The old material is zeroed.
	pub fn set_material(&mut self, material: Buffer) {
		self.material = material;
	}
}

#[derive(Debug)]
struct Entry {
	owner: ConnectionId,
	session: Arc<Mutex<Session>>,
}

#[derive(Debug)]
struct Inner {
	sessions: HashMap<u32, Entry>,
	next_id: u32,
}

/// All open sessions of one running service.
///
/// Ids start at a random offset per table and only move forward, so an id
/// handed out before a restart does not name a session created after it.
/// Access to any one session is mutually exclusive.
#[derive(Debug)]
pub struct SessionTable {
	inner: Mutex<Inner>,
	max_sessions: usize,
}

impl SessionTable {
	/// Create an empty table that holds at most `max_sessions` sessions.
	#[must_use]
	pub fn new(max_sessions: usize) -> Self {
		let next_id = rand::thread_rng().gen_range(1..=u32::MAX);
		Self {
			inner: Mutex::new(Inner { sessions: HashMap::new(), next_id }),
			max_sessions,
		}
	}

	/// Number of open sessions.
	#[must_use]
	pub fn len(&self) -> usize {
		self.inner.lock().map_or(0, |inner| inner.sessions.len())
	}

	/// True if no session is open.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// True if another session can be opened right now.
	#[must_use]
	pub fn has_capacity(&self) -> bool {
		self.len() < self.max_sessions
	}

	/// Register a new session owned by `owner` and return its id.
	///
	/// On failure the material is handed back so the caller can tear the
	/// session down.
	pub fn insert(
		&self,
		owner: ConnectionId,
		material: Buffer,
	) -> Result<u32, (ServiceStatus, Buffer)> {
		let Ok(mut inner) = self.inner.lock() else {
			return Err((POISONED, material));
		};
		if inner.sessions.len() >= self.max_sessions {
			return Err((
				ServiceStatus::failure(AesmResult::MAX_NUM_SESSION_REACHED),
				material,
			));
		}

		let mut id = inner.next_id;
		while id == 0 || inner.sessions.contains_key(&id) {
			id = id.wrapping_add(1);
		}
		inner.next_id = id.wrapping_add(1);

		let session = Arc::new(Mutex::new(Session { material, closed: false }));
		inner.sessions.insert(id, Entry { owner, session });
		tracing::debug!(id, ?owner, "session opened");

		Ok(id)
	}

	/// Run `f` with exclusive access to the open session `id`.
	pub fn with_session<T>(
		&self,
		id: u32,
		f: impl FnOnce(&mut Session) -> LogicResult<T>,
	) -> LogicResult<T> {
		// Do not hold the table lock while the logic runs.
		let session = {
			let inner = self.inner.lock().map_err(|_| POISONED)?;
			let entry = inner.sessions.get(&id).ok_or(INVALID)?;
			Arc::clone(&entry.session)
		};

		let mut session = session.lock().map_err(|_| POISONED)?;
		if session.closed {
			return Err(INVALID);
		}

		f(&mut session)
	}

	/// Close the session `id` and hand back its key material so the logic can
	/// tear it down.
	pub fn close(&self, id: u32) -> LogicResult<Buffer> {
		let session = {
			let mut inner = self.inner.lock().map_err(|_| POISONED)?;
			inner.sessions.remove(&id).ok_or(INVALID)?.session
		};

		let mut session = session.lock().map_err(|_| POISONED)?;
		if session.closed {
			return Err(INVALID);
		}
		session.closed = true;
		tracing::debug!(id, "session closed");

		Ok(std::mem::take(&mut session.material))
	}

	/// Close every session owned by `owner`, returning their key material.
	pub fn reclaim(&self, owner: ConnectionId) -> Vec<Buffer> {
		let owned: Vec<_> = match self.inner.lock() {
			Ok(mut inner) => {
				let ids: Vec<u32> = inner
					.sessions
					.iter()
					.filter(|(_, entry)| entry.owner == owner)
					.map(|(id, _)| *id)
					.collect();
				ids.into_iter()
					.filter_map(|id| inner.sessions.remove(&id))
					.map(|entry| entry.session)
					.collect()
			}
			Err(_) => return Vec::new(),
		};

		let mut reclaimed = Vec::with_capacity(owned.len());
		for session in owned {
			if let Ok(mut session) = session.lock() {
				if !session.closed {
					session.closed = true;
					reclaimed.push(std::mem::take(&mut session.material));
				}
			}
		}
		if !reclaimed.is_empty() {
			tracing::info!(
				?owner,
				count = reclaimed.len(),
				"reclaimed sessions of dropped connection"
			);
		}

		reclaimed
	}
}

/// Session id carried in the first bytes of a PSE message.
pub(crate) fn session_id_of(pse_message: &[u8]) -> Option<u32> {
	let bytes = pse_message.get(..SESSION_ID_LEN)?;
	let bytes: [u8; SESSION_ID_LEN] = bytes.try_into().ok()?;

	Some(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod test {
	use super::*;

	fn material(byte: u8) -> Buffer {
		Buffer::copy_from_slice(&[byte; 8]).unwrap()
	}

	#[test]
	fn closed_ids_stay_invalid() {
		let table = SessionTable::new(4);
		let id = table.insert(ConnectionId(1), material(1)).unwrap();
		assert_ne!(id, 0);

		table
			.with_session(id, |s| {
				assert_eq!(s.material().as_slice(), &[1; 8]);
				Ok(())
			})
			.unwrap();

		let released = table.close(id).unwrap();
		assert_eq!(released.as_slice(), &[1; 8]);

		assert_eq!(table.close(id), Err(INVALID));
		assert_eq!(table.with_session(id, |_| Ok(())), Err(INVALID));

		// a new session never reuses the closed id
		let next = table.insert(ConnectionId(1), material(2)).unwrap();
		assert_ne!(next, id);
	}

	#[test]
	fn unknown_id_is_invalid() {
		let table = SessionTable::new(4);
		assert_eq!(table.with_session(12345, |_| Ok(())), Err(INVALID));
	}

	#[test]
	fn table_enforces_max_sessions() {
		let table = SessionTable::new(2);
		table.insert(ConnectionId(1), material(1)).unwrap();
		table.insert(ConnectionId(1), material(2)).unwrap();
		assert!(!table.has_capacity());
		let (status, returned) =
			table.insert(ConnectionId(1), material(3)).unwrap_err();
		assert_eq!(
			status,
			ServiceStatus::failure(AesmResult::MAX_NUM_SESSION_REACHED)
		);
		assert_eq!(returned.as_slice(), &[3; 8]);
	}

	#[test]
	fn reclaim_only_takes_the_owners_sessions() {
		let table = SessionTable::new(8);
		let a = table.insert(ConnectionId(1), material(1)).unwrap();
		let b = table.insert(ConnectionId(2), material(2)).unwrap();
		let c = table.insert(ConnectionId(1), material(3)).unwrap();

		let reclaimed = table.reclaim(ConnectionId(1));
		assert_eq!(reclaimed.len(), 2);
		assert_eq!(table.len(), 1);

		assert_eq!(table.with_session(a, |_| Ok(())), Err(INVALID));
		assert_eq!(table.with_session(c, |_| Ok(())), Err(INVALID));
		assert!(table.with_session(b, |_| Ok(())).is_ok());
	}

	#[test]
	fn session_id_is_little_endian_prefix() {
		assert_eq!(session_id_of(&[1, 0, 0, 0, 0xff]), Some(1));
		assert_eq!(session_id_of(&[0x78, 0x56, 0x34, 0x12]), Some(0x1234_5678));
		assert_eq!(session_id_of(&[1, 2, 3]), None);
	}
}
