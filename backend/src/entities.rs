use std::{borrow::Cow, cell::RefCell, rc::Rc};

use candid::CandidType;
use ic_stable_structures::{
    memory_manager::{MemoryId, MemoryManager, VirtualMemory},
    storable::Bound,
    DefaultMemoryImpl, Memory, StableBTreeMap, StableCell, Storable,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A career profile document. One per owner identity at steady state.
#[derive(CandidType, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub owner_id: String,
    pub skills: String,
    pub interests: String,
    pub projects: String,
    /// Absent until a generation succeeds, never an empty string.
    pub recommendation: Option<String>,
    pub version: u64,
}

/// The caller-editable part of a profile.
#[derive(CandidType, Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileInput {
    pub skills: String,
    pub interests: String,
    pub projects: String,
}

impl From<&Profile> for ProfileInput {
    fn from(profile: &Profile) -> Self {
        Self {
            skills: profile.skills.clone(),
            interests: profile.interests.clone(),
            projects: profile.projects.clone(),
        }
    }
}

/// Partial update applied by [`ProfileStore::update`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProfilePatch {
    /// Replaces skills, interests and projects. Leaves `recommendation` alone.
    Fields(ProfileInput),
    /// Overwrites `recommendation`.
    Recommendation(String),
}

impl ProfilePatch {
    /// Applies the patch in place and reports whether anything changed.
    /// The version is only bumped on change, so re-applying is a no-op.
    pub fn apply(self, profile: &mut Profile) -> bool {
        let changed = match self {
            ProfilePatch::Fields(input) => {
                let changed = ProfileInput::from(&*profile) != input;
                profile.skills = input.skills;
                profile.interests = input.interests;
                profile.projects = input.projects;
                changed
            }
            ProfilePatch::Recommendation(text) => {
                let changed = profile.recommendation.as_deref() != Some(text.as_str());
                profile.recommendation = Some(text);
                changed
            }
        };
        if changed {
            profile.version += 1;
        }
        changed
    }
}

/// Equality filters understood by [`ProfileStore::list`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProfileFilter {
    Owner(String),
}

impl ProfileFilter {
    pub fn matches(&self, profile: &Profile) -> bool {
        match self {
            ProfileFilter::Owner(owner_id) => &profile.owner_id == owner_id,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum StoreError {
    #[error("document {id} does not exist")]
    NotFound { id: String },
    #[error("document {id} is malformed: {reason}")]
    Malformed { id: String, reason: String },
    #[error("failed to encode document: {0}")]
    Encode(String),
    #[error("stable memory failure: {0}")]
    Memory(String),
}

/// The document store operations consumed by the pipeline and the profile service.
pub trait ProfileStore {
    fn get(&self, id: &str) -> Result<Option<Profile>, StoreError>;
    fn list(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, StoreError>;
    fn create(&self, owner_id: &str, input: ProfileInput) -> Result<Profile, StoreError>;
    fn update(&self, id: &str, patch: ProfilePatch) -> Result<Profile, StoreError>;
}

impl<S: ProfileStore> ProfileStore for Rc<S> {
    fn get(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        (**self).get(id)
    }

    fn list(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, StoreError> {
        (**self).list(filter)
    }

    fn create(&self, owner_id: &str, input: ProfileInput) -> Result<Profile, StoreError> {
        (**self).create(owner_id, input)
    }

    fn update(&self, id: &str, patch: ProfilePatch) -> Result<Profile, StoreError> {
        (**self).update(id, patch)
    }
}

/// CBOR bytes as they sit in stable memory. Decoding happens on read so a
/// corrupt value becomes an error instead of a trap.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawDocument(pub Vec<u8>);

impl RawDocument {
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, StoreError> {
        let mut encoded = Vec::new();
        ciborium::into_writer(value, &mut encoded).map_err(|e| StoreError::Encode(e.to_string()))?;
        Ok(Self(encoded))
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self, id: &str) -> Result<T, StoreError> {
        ciborium::from_reader(self.0.as_slice()).map_err(|e| StoreError::Malformed {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Storable for RawDocument {
    fn to_bytes(&self) -> Cow<[u8]> {
        Cow::Borrowed(&self.0)
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        Self(bytes.into_owned())
    }
    const BOUND: Bound = Bound::Unbounded;
}

fn profile_id(serial: u64) -> String {
    format!("prf{serial:017x}")
}

/// Owner index keys sort by owner first; neither principal text nor profile
/// ids contain NUL.
fn owner_prefix(owner_id: &str) -> String {
    format!("{owner_id}\0")
}

fn owner_key(owner_id: &str, profile_id: &str) -> String {
    format!("{}{profile_id}", owner_prefix(owner_id))
}

/// Stable-memory backed profile collection, indexed by owner.
pub struct ProfileRepository<M: Memory> {
    documents: RefCell<StableBTreeMap<String, RawDocument, M>>,
    by_owner: RefCell<StableBTreeMap<String, (), M>>,
    next_id: RefCell<StableCell<u64, M>>,
}

impl<M: Memory> ProfileRepository<M> {
    pub fn init(documents: M, owners: M, serial: M) -> Result<Self, StoreError> {
        let next_id =
            StableCell::init(serial, 1).map_err(|e| StoreError::Memory(format!("{e:?}")))?;
        Ok(Self {
            documents: RefCell::new(StableBTreeMap::init(documents)),
            by_owner: RefCell::new(StableBTreeMap::init(owners)),
            next_id: RefCell::new(next_id),
        })
    }

    fn owned_ids(&self, owner_id: &str) -> Vec<String> {
        let prefix = owner_prefix(owner_id);
        self.by_owner
            .borrow()
            .range(prefix.clone()..)
            .map(|(key, ())| key)
            .take_while(|key| key.starts_with(&prefix))
            .map(|key| key[prefix.len()..].to_string())
            .collect()
    }

    fn allocate_id(&self) -> Result<String, StoreError> {
        let mut cell = self.next_id.borrow_mut();
        let serial = *cell.get();
        cell.set(serial + 1)
            .map_err(|e| StoreError::Memory(format!("{e:?}")))?;
        Ok(profile_id(serial))
    }

    fn write(&self, profile: &Profile) -> Result<(), StoreError> {
        let raw = RawDocument::encode(profile)?;
        self.documents.borrow_mut().insert(profile.id.clone(), raw);
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.documents.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn put_raw(&self, owner_id: &str, id: &str, raw: RawDocument) {
        self.documents.borrow_mut().insert(id.to_string(), raw);
        self.by_owner.borrow_mut().insert(owner_key(owner_id, id), ());
    }
}

impl<M: Memory> ProfileStore for ProfileRepository<M> {
    fn get(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        self.documents
            .borrow()
            .get(&id.to_string())
            .map(|raw| raw.decode(id))
            .transpose()
    }

    fn list(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, StoreError> {
        let ProfileFilter::Owner(owner_id) = filter;
        let mut matching = Vec::new();
        for id in self.owned_ids(owner_id) {
            match self.get(&id)? {
                Some(profile) if filter.matches(&profile) => matching.push(profile),
                Some(_) => log::warn!("owner index entry {id} does not belong to {owner_id}"),
                None => log::warn!("owner index points at missing document {id}"),
            }
        }
        Ok(matching)
    }

    fn create(&self, owner_id: &str, input: ProfileInput) -> Result<Profile, StoreError> {
        let profile = Profile {
            id: self.allocate_id()?,
            owner_id: owner_id.to_string(),
            skills: input.skills,
            interests: input.interests,
            projects: input.projects,
            recommendation: None,
            version: 1,
        };
        self.write(&profile)?;
        self.by_owner
            .borrow_mut()
            .insert(owner_key(&profile.owner_id, &profile.id), ());
        Ok(profile)
    }

    fn update(&self, id: &str, patch: ProfilePatch) -> Result<Profile, StoreError> {
        let mut profile = self.get(id)?.ok_or_else(|| StoreError::NotFound {
            id: id.to_string(),
        })?;
        if patch.apply(&mut profile) {
            self.write(&profile)?;
        }
        Ok(profile)
    }
}

pub type Memo = VirtualMemory<DefaultMemoryImpl>;

const SERIAL_PROFILE_MEMORY_ID: MemoryId = MemoryId::new(0);
const PROFILE_MEMORY_ID: MemoryId = MemoryId::new(1);
pub(crate) const CONFIG_MEMORY_ID: MemoryId = MemoryId::new(2);
const PROFILE_OWNER_MEMORY_ID: MemoryId = MemoryId::new(3);

thread_local! {
    static MEMORY_MANAGER: RefCell<MemoryManager<DefaultMemoryImpl>> = RefCell::new(
        MemoryManager::init(DefaultMemoryImpl::default())
    );

    static PROFILE_REPOSITORY: Rc<ProfileRepository<Memo>> = Rc::new(
        ProfileRepository::init(
            MEMORY_MANAGER.with_borrow(|m| m.get(PROFILE_MEMORY_ID)),
            MEMORY_MANAGER.with_borrow(|m| m.get(PROFILE_OWNER_MEMORY_ID)),
            MEMORY_MANAGER.with_borrow(|m| m.get(SERIAL_PROFILE_MEMORY_ID)),
        ).expect("failed to init PROFILE_REPOSITORY")
    );
}

/// Virtual memory for the given id, shared with the other stable structures.
pub(crate) fn memory(id: MemoryId) -> Memo {
    MEMORY_MANAGER.with_borrow(|m| m.get(id))
}

/// Handle on the canister's profile collection.
pub fn profile_repository() -> Rc<ProfileRepository<Memo>> {
    PROFILE_REPOSITORY.with(Rc::clone)
}
