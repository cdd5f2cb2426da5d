//! In-process broker for embedded mode and tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;

use opsboard_core::errors::{OpsError, OpsResult};
use opsboard_core::keys;
use opsboard_core::traits::Broker;

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<Vec<u8>>>,
    kv: HashMap<String, (Vec<u8>, Option<Instant>)>,
    sets: HashMap<String, HashSet<String>>,
    failing_drains: HashSet<String>,
}

/// Broker backed by process memory. Single-instance by nature; embedded
/// deployments run the API and worker in one process so this is enough.
pub struct MemoryBroker {
    state: Mutex<State>,
    push_notify: Notify,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            push_notify: Notify::new(),
        }
    }

    /// Makes `drain_queue` fail for `queue`. Lets tests exercise the
    /// partial-failure path of bulk purges.
    pub fn fail_drains_for(&self, queue: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_drains.insert(queue.to_string());
    }

    fn now() -> Instant {
        Instant::now()
    }

    fn live_value(entry: &(Vec<u8>, Option<Instant>)) -> Option<Vec<u8>> {
        match entry.1 {
            Some(expires_at) if Self::now() >= expires_at => None,
            _ => Some(entry.0.clone()),
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Glob match supporting `*` only, which is all the key layout uses.
fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    if !key.starts_with(first) {
        return false;
    }
    let mut rest = &key[first.len()..];
    let mut last_part: Option<&str> = None;
    for part in parts {
        if let Some(prev) = last_part.take() {
            match rest.find(prev) {
                Some(idx) => rest = &rest[idx + prev.len()..],
                None => return false,
            }
        }
        last_part = Some(part);
    }
    match last_part {
        None => rest.is_empty(),
        Some("") => true,
        Some(tail) => rest.contains(tail) && rest.ends_with(tail),
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn ping(&self) -> OpsResult<()> {
        Ok(())
    }

    async fn queue_len(&self, queue: &str) -> OpsResult<u64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .lists
            .get(&keys::queue(queue))
            .map(|list| list.len() as u64)
            .unwrap_or(0))
    }

    async fn push(&self, queue: &str, payload: &[u8]) -> OpsResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            state
                .lists
                .entry(keys::queue(queue))
                .or_default()
                .push_back(payload.to_vec());
        }
        self.push_notify.notify_waiters();
        Ok(())
    }

    async fn pop(
        &self,
        queues: &[String],
        timeout: Duration,
    ) -> OpsResult<Option<(String, Vec<u8>)>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register for wakeups before checking, so a push between the
            // check and the await is not lost.
            let notified = self.push_notify.notified();
            {
                let mut state = self.state.lock().unwrap();
                for queue in queues {
                    if let Some(list) = state.lists.get_mut(&keys::queue(queue)) {
                        if let Some(payload) = list.pop_front() {
                            return Ok(Some((queue.clone(), payload)));
                        }
                    }
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn drain_queue(&self, queue: &str) -> OpsResult<u64> {
        let mut state = self.state.lock().unwrap();
        if state.failing_drains.contains(queue) {
            return Err(OpsError::upstream(format!(
                "broker unavailable while draining '{queue}'"
            )));
        }
        let removed = state
            .lists
            .remove(&keys::queue(queue))
            .map(|list| list.len() as u64)
            .unwrap_or(0);
        Ok(removed)
    }

    async fn get(&self, key: &str) -> OpsResult<Option<Vec<u8>>> {
        let mut state = self.state.lock().unwrap();
        match state.kv.get(key) {
            Some(entry) => match Self::live_value(entry) {
                Some(value) => Ok(Some(value)),
                None => {
                    state.kv.remove(key);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> OpsResult<()> {
        let mut state = self.state.lock().unwrap();
        state.kv.insert(key.to_string(), (value.to_vec(), None));
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> OpsResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .kv
            .insert(key.to_string(), (value.to_vec(), Some(Self::now() + ttl)));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> OpsResult<u64> {
        let mut state = self.state.lock().unwrap();
        let mut removed = 0;
        for key in keys {
            if state.kv.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn scan(&self, pattern: &str) -> OpsResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        let now = Self::now();
        let mut matches: Vec<String> = state
            .kv
            .iter()
            .filter(|(_, (_, expiry))| match expiry {
                Some(at) => now < *at,
                None => true,
            })
            .map(|(key, _)| key.clone())
            .filter(|key| glob_match(pattern, key))
            .collect();
        matches.sort();
        Ok(matches)
    }

    async fn exists(&self, key: &str) -> OpsResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn set_add(&self, set: &str, member: &str) -> OpsResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_contains(&self, set: &str, member: &str) -> OpsResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sets
            .get(set)
            .map(|members| members.contains(member))
            .unwrap_or(false))
    }

    async fn set_members(&self, set: &str) -> OpsResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut members: Vec<String> = state
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn set_remove(&self, set: &str, member: &str) -> OpsResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(members) = state.sets.get_mut(set) {
            members.remove(member);
        }
        Ok(())
    }
}
