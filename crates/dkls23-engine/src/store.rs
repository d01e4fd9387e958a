//! Key share persistence with single-writer leases

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{mapref::entry::Entry, DashMap};
use tracing::debug;

use crate::key_share::{KeyId, KeyShare};
use crate::types::PartyIndex;
use crate::{Error, Result};

/// Exclusive right to write one party's share of one key.
///
/// Obtained from [`KeyShareStore::lease`] and handed back through
/// `save`, `delete` or `release`.
#[derive(Debug, PartialEq, Eq)]
pub struct WriteLease {
    party_index: PartyIndex,
    key_id: KeyId,
    token: u64,
}

impl WriteLease {
    pub fn party_index(&self) -> PartyIndex {
        self.party_index
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }
}

/// Storage for key shares.
///
/// Reads are unrestricted. Writes need a [`WriteLease`]; at most one lease
/// exists per `(party, key)` at a time.
pub trait KeyShareStore: Send + Sync {
    /// Take the write lease, `StoreBusy` while another writer holds it
    fn lease(&self, party_index: PartyIndex, key_id: &KeyId) -> Result<WriteLease>;

    fn load(&self, party_index: PartyIndex, key_id: &KeyId) -> Result<KeyShare>;

    /// Store `share` under the lease; the lease stays held
    fn save(&self, lease: &WriteLease, share: KeyShare) -> Result<()>;

    /// Remove the stored share and give up the lease
    fn delete(&self, lease: WriteLease) -> Result<()>;

    /// Give up the lease without writing
    fn release(&self, lease: WriteLease);
}

/// In-memory [`KeyShareStore`]
#[derive(Default)]
pub struct MemoryKeyShareStore {
    shares: DashMap<(PartyIndex, KeyId), KeyShare>,
    leases: DashMap<(PartyIndex, KeyId), u64>,
    next_token: AtomicU64,
}

impl MemoryKeyShareStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored shares
    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    fn check_lease(&self, lease: &WriteLease) -> Result<()> {
        match self.leases.get(&(lease.party_index, lease.key_id)) {
            Some(token) if *token == lease.token => Ok(()),
            _ => Err(Error::StoreBusy(lease.key_id.to_string())),
        }
    }
}

impl KeyShareStore for MemoryKeyShareStore {
    fn lease(&self, party_index: PartyIndex, key_id: &KeyId) -> Result<WriteLease> {
        match self.leases.entry((party_index, *key_id)) {
            Entry::Occupied(_) => Err(Error::StoreBusy(key_id.to_string())),
            Entry::Vacant(slot) => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                slot.insert(token);
                debug!(party_index, key_id = %key_id, "Write lease taken");
                Ok(WriteLease {
                    party_index,
                    key_id: *key_id,
                    token,
                })
            }
        }
    }

    fn load(&self, party_index: PartyIndex, key_id: &KeyId) -> Result<KeyShare> {
        self.shares
            .get(&(party_index, *key_id))
            .map(|share| share.clone())
            .ok_or_else(|| Error::KeyShareNotFound(format!("{key_id} for party {party_index}")))
    }

    fn save(&self, lease: &WriteLease, share: KeyShare) -> Result<()> {
        self.check_lease(lease)?;
        if share.party_index != lease.party_index || share.key_id() != lease.key_id {
            return Err(Error::InvalidParameters(format!(
                "lease for {} of party {} cannot store {} of party {}",
                lease.key_id,
                lease.party_index,
                share.key_id(),
                share.party_index
            )));
        }
        self.shares.insert((lease.party_index, lease.key_id), share);
        Ok(())
    }

    fn delete(&self, lease: WriteLease) -> Result<()> {
        self.check_lease(&lease)?;
        let key = (lease.party_index, lease.key_id);
        let removed = self.shares.remove(&key);
        self.release(lease);
        match removed {
            Some(_) => Ok(()),
            None => Err(Error::KeyShareNotFound(format!(
                "{} for party {}",
                key.1, key.0
            ))),
        }
    }

    fn release(&self, lease: WriteLease) {
        self.leases
            .remove_if(&(lease.party_index, lease.key_id), |_, token| {
                *token == lease.token
            });
    }
}
