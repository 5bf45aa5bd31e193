//! Test doubles shared by the module tests.

use std::{
    cell::{Cell, RefCell},
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

pub use futures::executor::block_on;
use ic_stable_structures::DefaultMemoryImpl;

use crate::{
    client::{ClientError, MentorBackend},
    entities::{
        Profile, ProfileFilter, ProfileInput, ProfilePatch, ProfileRepository, ProfileStore,
        StoreError,
    },
    model::{Completion, CompletionModel, ModelError},
    pipeline::{self, Execution},
    service::ProfileService,
};

pub type MemoryRepository = ProfileRepository<DefaultMemoryImpl>;

pub fn memory_store() -> Rc<MemoryRepository> {
    Rc::new(
        ProfileRepository::init(
            DefaultMemoryImpl::default(),
            DefaultMemoryImpl::default(),
            DefaultMemoryImpl::default(),
        )
        .unwrap(),
    )
}

/// Counts calls per store operation.
pub struct CountingStore<S> {
    inner: S,
    gets: Cell<usize>,
    lists: Cell<usize>,
    creates: Cell<usize>,
    updates: Cell<usize>,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            gets: Cell::new(0),
            lists: Cell::new(0),
            creates: Cell::new(0),
            updates: Cell::new(0),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.get()
    }

    pub fn creates(&self) -> usize {
        self.creates.get()
    }

    pub fn updates(&self) -> usize {
        self.updates.get()
    }

    pub fn total_calls(&self) -> usize {
        self.gets.get() + self.lists.get() + self.creates.get() + self.updates.get()
    }
}

fn bump(counter: &Cell<usize>) {
    counter.set(counter.get() + 1);
}

impl<S: ProfileStore> ProfileStore for CountingStore<S> {
    fn get(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        bump(&self.gets);
        self.inner.get(id)
    }

    fn list(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, StoreError> {
        bump(&self.lists);
        self.inner.list(filter)
    }

    fn create(&self, owner_id: &str, input: ProfileInput) -> Result<Profile, StoreError> {
        bump(&self.creates);
        self.inner.create(owner_id, input)
    }

    fn update(&self, id: &str, patch: ProfilePatch) -> Result<Profile, StoreError> {
        bump(&self.updates);
        self.inner.update(id, patch)
    }
}

/// Every operation fails as if stable memory were unavailable.
pub struct FailingStore;

impl FailingStore {
    fn error() -> StoreError {
        StoreError::Memory("memory unavailable".to_string())
    }
}

impl ProfileStore for FailingStore {
    fn get(&self, _id: &str) -> Result<Option<Profile>, StoreError> {
        Err(Self::error())
    }

    fn list(&self, _filter: &ProfileFilter) -> Result<Vec<Profile>, StoreError> {
        Err(Self::error())
    }

    fn create(&self, _owner_id: &str, _input: ProfileInput) -> Result<Profile, StoreError> {
        Err(Self::error())
    }

    fn update(&self, _id: &str, _patch: ProfilePatch) -> Result<Profile, StoreError> {
        Err(Self::error())
    }
}

/// Reads and creates go through; every update fails.
pub struct UpdateFailingStore<S>(pub S);

impl<S: ProfileStore> ProfileStore for UpdateFailingStore<S> {
    fn get(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        self.0.get(id)
    }

    fn list(&self, filter: &ProfileFilter) -> Result<Vec<Profile>, StoreError> {
        self.0.list(filter)
    }

    fn create(&self, owner_id: &str, input: ProfileInput) -> Result<Profile, StoreError> {
        self.0.create(owner_id, input)
    }

    fn update(&self, _id: &str, _patch: ProfilePatch) -> Result<Profile, StoreError> {
        Err(FailingStore::error())
    }
}

struct Script {
    reply: Result<Completion, ModelError>,
    calls: Cell<usize>,
    prompts: RefCell<Vec<String>>,
}

/// Model returning a fixed reply and recording the prompts it was given.
#[derive(Clone)]
pub struct ScriptedModel(Rc<Script>);

impl ScriptedModel {
    fn with(reply: Result<Completion, ModelError>) -> Self {
        Self(Rc::new(Script {
            reply,
            calls: Cell::new(0),
            prompts: RefCell::new(Vec::new()),
        }))
    }

    pub fn replying(text: &str) -> Self {
        Self::with(Ok(Completion::from_text(text)))
    }

    pub fn empty() -> Self {
        Self::with(Ok(Completion::default()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with(Err(ModelError::Rejected {
            code: "SysTransient".to_string(),
            message: message.to_string(),
        }))
    }

    pub fn calls(&self) -> usize {
        self.0.calls.get()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.0.prompts.borrow().clone()
    }
}

impl CompletionModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<Completion, ModelError> {
        bump(&self.0.calls);
        self.0.prompts.borrow_mut().push(prompt.to_string());
        self.0.reply.clone()
    }
}

/// Returns `Pending` once, waking itself so the executor polls again.
struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

struct Backend {
    owner: String,
    store: Rc<MemoryRepository>,
    model: ScriptedModel,
    fail_fetches: Cell<bool>,
    fail_saves: Cell<bool>,
    blank_executions: Cell<bool>,
    yield_on_execute: Cell<bool>,
}

/// Wires the presentation layer straight to the profile service and the
/// pipeline over an in-memory store.
#[derive(Clone)]
pub struct InProcessBackend(Rc<Backend>);

impl InProcessBackend {
    pub fn new(owner: &str, model: ScriptedModel) -> Self {
        Self(Rc::new(Backend {
            owner: owner.to_string(),
            store: memory_store(),
            model,
            fail_fetches: Cell::new(false),
            fail_saves: Cell::new(false),
            blank_executions: Cell::new(false),
            yield_on_execute: Cell::new(false),
        }))
    }

    fn service(&self) -> ProfileService<MemoryRepository> {
        ProfileService::new(self.0.store.clone())
    }

    pub fn seed(&self, input: ProfileInput) -> Profile {
        self.0.store.create(&self.0.owner, input).unwrap()
    }

    pub fn recommend(&self, id: &str, text: &str) {
        self.0
            .store
            .update(id, ProfilePatch::Recommendation(text.to_string()))
            .unwrap();
    }

    pub fn profile_count(&self) -> u64 {
        self.0.store.len()
    }

    pub fn fail_fetches(&self) {
        self.0.fail_fetches.set(true);
    }

    pub fn fail_saves(&self) {
        self.0.fail_saves.set(true);
    }

    pub fn blank_executions(&self) {
        self.0.blank_executions.set(true);
    }

    pub fn yield_on_execute(&self) {
        self.0.yield_on_execute.set(true);
    }
}

fn backend_error(err: impl std::fmt::Display) -> ClientError {
    ClientError::Backend(err.to_string())
}

impl MentorBackend for InProcessBackend {
    async fn own_profile(&self) -> Result<Option<Profile>, ClientError> {
        if self.0.fail_fetches.get() {
            return Err(backend_error("network down"));
        }
        self.service().own_profile(&self.0.owner).map_err(backend_error)
    }

    async fn profile(&self, id: &str) -> Result<Profile, ClientError> {
        self.service()
            .profile(&self.0.owner, id)
            .map_err(backend_error)
    }

    async fn save_profile(&self, input: ProfileInput) -> Result<Profile, ClientError> {
        if self.0.fail_saves.get() {
            return Err(backend_error("network down"));
        }
        self.service()
            .save_profile(&self.0.owner, input)
            .map_err(backend_error)
    }

    async fn execute(&self, body: String) -> Result<Execution, ClientError> {
        if self.0.yield_on_execute.get() {
            YieldNow(false).await;
        }
        if self.0.blank_executions.get() {
            return Ok(Execution {
                status_code: pipeline::STATUS_FAILED,
                response: String::new(),
            });
        }
        Ok(pipeline::execute(self.0.store.clone(), Ok(self.0.model.clone()), &body).await)
    }
}
