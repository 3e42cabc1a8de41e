//! In-memory backend adapter
//!
//! A `BackendAdapter` over a mutex-guarded map, with failure injection and
//! listing-visibility lag. The engine, manifest and client tests run against
//! this instead of a real backend; it is also handy for embedding callers
//! that want obstor semantics without any remote service.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::traits::{BackendAdapter, Entry, IdResolver, ObjectMeta, PutOptions};

/// Failure kinds the adapter can be told to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    Unavailable,
    Unauthorized,
    NotFound,
    Conflict,
}

impl InjectedFault {
    fn to_error(self, context: &str) -> Error {
        match self {
            InjectedFault::Unavailable => Error::Unavailable(format!("injected: {context}")),
            InjectedFault::Unauthorized => Error::Unauthorized(format!("injected: {context}")),
            InjectedFault::NotFound => Error::NotFound(format!("injected: {context}")),
            InjectedFault::Conflict => Error::Conflict(format!("injected: {context}")),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    /// container -> object name -> bytes
    objects: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    /// faults consumed by any operation, in order
    general_faults: VecDeque<InjectedFault>,
    /// object name -> (fault, remaining uses; None = always)
    object_faults: HashMap<String, (InjectedFault, Option<u32>)>,
    /// object name -> number of list calls it stays invisible for
    listing_lag: HashMap<String, u32>,
}

/// In-memory [`BackendAdapter`] with failure injection
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    state: Mutex<MemoryState>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fault consumed by the next operation, whatever it is
    pub fn fail_next(&self, fault: InjectedFault) {
        self.state.lock().expect("memory adapter lock").general_faults.push_back(fault);
    }

    /// Make operations on one object fail. `times: None` fails forever.
    pub fn fail_object(&self, name: &str, fault: InjectedFault, times: Option<u32>) {
        if times == Some(0) {
            return;
        }
        self.state
            .lock()
            .expect("memory adapter lock")
            .object_faults
            .insert(name.to_string(), (fault, times));
    }

    /// Hide an object from the next `lists` listing calls, mimicking an
    /// eventually-consistent backend
    pub fn delay_visibility(&self, name: &str, lists: u32) {
        self.state
            .lock()
            .expect("memory adapter lock")
            .listing_lag
            .insert(name.to_string(), lists);
    }

    /// Names stored in a container, in order
    pub fn names(&self, container: &str) -> Vec<String> {
        let state = self.state.lock().expect("memory adapter lock");
        state
            .objects
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn take_fault(&self, name: Option<&str>, context: &str) -> Result<()> {
        let mut state = self.state.lock().expect("memory adapter lock");
        if let Some(fault) = state.general_faults.pop_front() {
            return Err(fault.to_error(context));
        }
        let Some(name) = name else {
            return Ok(());
        };
        let hit = match state.object_faults.get_mut(name) {
            None => None,
            Some((fault, remaining)) => {
                let fault = *fault;
                let exhausted = match remaining {
                    None => false,
                    Some(n) => {
                        *n -= 1;
                        *n == 0
                    }
                };
                Some((fault, exhausted))
            }
        };
        match hit {
            Some((fault, exhausted)) => {
                if exhausted {
                    state.object_faults.remove(name);
                }
                Err(fault.to_error(context))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BackendAdapter for MemoryAdapter {
    async fn list(&self, container: &str, prefix: &str, limit: Option<usize>) -> Result<Vec<Entry>> {
        self.take_fault(None, &format!("list {container}/{prefix}"))?;

        let mut state = self.state.lock().expect("memory adapter lock");
        let mut lagged: Vec<String> = Vec::new();
        for (name, remaining) in state.listing_lag.iter_mut() {
            if *remaining > 0 {
                *remaining -= 1;
                lagged.push(name.clone());
            }
        }
        state.listing_lag.retain(|_, remaining| *remaining > 0);

        let entries = state
            .objects
            .get(container)
            .map(|objects| {
                objects
                    .iter()
                    .filter(|(name, _)| name.starts_with(prefix))
                    .filter(|(name, _)| !lagged.contains(*name))
                    .map(|(name, data)| Entry {
                        name: name.clone(),
                        size: data.len() as u64,
                        is_prefix: name.ends_with('/'),
                    })
                    .take(limit.unwrap_or(usize::MAX))
                    .collect()
            })
            .unwrap_or_default();
        Ok(entries)
    }

    async fn get(&self, container: &str, name: &str) -> Result<Vec<u8>> {
        self.take_fault(Some(name), &format!("get {container}/{name}"))?;

        let state = self.state.lock().expect("memory adapter lock");
        state
            .objects
            .get(container)
            .and_then(|objects| objects.get(name))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{container}/{name}")))
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        data: Vec<u8>,
        _options: PutOptions,
    ) -> Result<()> {
        self.take_fault(Some(name), &format!("put {container}/{name}"))?;

        let mut state = self.state.lock().expect("memory adapter lock");
        state
            .objects
            .entry(container.to_string())
            .or_default()
            .insert(name.to_string(), data);
        Ok(())
    }

    async fn delete(&self, container: &str, names: &[String]) -> Result<()> {
        self.take_fault(names.first().map(String::as_str), &format!("delete in {container}"))?;

        let mut state = self.state.lock().expect("memory adapter lock");
        if let Some(objects) = state.objects.get_mut(container) {
            for name in names {
                objects.remove(name);
            }
        }
        Ok(())
    }

    async fn stat(&self, container: &str, name: &str) -> Result<ObjectMeta> {
        self.take_fault(Some(name), &format!("stat {container}/{name}"))?;

        let state = self.state.lock().expect("memory adapter lock");
        let data = state
            .objects
            .get(container)
            .and_then(|objects| objects.get(name))
            .ok_or_else(|| Error::NotFound(format!("{container}/{name}")))?;
        Ok(ObjectMeta {
            size: data.len() as u64,
            ..ObjectMeta::default()
        })
    }
}

/// In-memory [`IdResolver`] for project/folder path tests
#[derive(Debug, Default)]
pub struct MemoryResolver {
    state: Mutex<ResolverState>,
}

#[derive(Debug, Default)]
struct ResolverState {
    /// name -> ids (several ids model an ambiguous name)
    projects: HashMap<String, Vec<String>>,
    /// id -> name
    project_names: HashMap<String, String>,
    /// (project id, folder, name) -> object id
    objects: HashMap<(String, String, String), String>,
    /// object id -> (project id, folder, name)
    locations: HashMap<String, (String, String, String)>,
    lookups: u64,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(self, name: &str, id: &str) -> Self {
        {
            let mut state = self.state.lock().expect("memory resolver lock");
            state.projects.entry(name.to_string()).or_default().push(id.to_string());
            state.project_names.insert(id.to_string(), name.to_string());
        }
        self
    }

    pub fn with_object(self, project_id: &str, folder: &str, name: &str, id: &str) -> Self {
        {
            let mut state = self.state.lock().expect("memory resolver lock");
            let key = (project_id.to_string(), folder.to_string(), name.to_string());
            state.objects.insert(key.clone(), id.to_string());
            state.locations.insert(id.to_string(), key);
        }
        self
    }

    /// Number of lookups served, for cache assertions
    pub fn lookups(&self) -> u64 {
        self.state.lock().expect("memory resolver lock").lookups
    }
}

#[async_trait]
impl IdResolver for MemoryResolver {
    async fn resolve_project(&self, name: &str) -> Result<String> {
        let mut state = self.state.lock().expect("memory resolver lock");
        state.lookups += 1;
        match state.projects.get(name).map(Vec::as_slice) {
            Some([id]) => Ok(id.clone()),
            Some([]) | None => Err(Error::NotFound(format!("no project named {name:?}"))),
            Some(_) => Err(Error::Conflict(format!(
                "more than one project named {name:?}"
            ))),
        }
    }

    async fn project_name(&self, id: &str) -> Result<String> {
        let mut state = self.state.lock().expect("memory resolver lock");
        state.lookups += 1;
        state
            .project_names
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no project with id {id:?}")))
    }

    async fn resolve_object(&self, project_id: &str, folder: &str, name: &str) -> Result<String> {
        let mut state = self.state.lock().expect("memory resolver lock");
        state.lookups += 1;
        let key = (project_id.to_string(), folder.to_string(), name.to_string());
        state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no object at {folder}/{name} in {project_id}")))
    }

    async fn object_location(&self, id: &str, project_id: &str) -> Result<(String, String)> {
        let mut state = self.state.lock().expect("memory resolver lock");
        state.lookups += 1;
        match state.locations.get(id) {
            Some((project, folder, name)) if project == project_id => {
                Ok((folder.clone(), name.clone()))
            }
            _ => Err(Error::NotFound(format!("no object {id:?} in {project_id}"))),
        }
    }
}
