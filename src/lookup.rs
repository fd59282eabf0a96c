// ecmctl - CLI for the Cradlepoint ECM device-management API
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Fixed enumerations used by the activity log, plus the small TTL cache
//! backing its name lookups.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::client::ApiClient;

/// Actor kinds as encoded by the activity_logs resource.
pub fn actor_type(id: u64) -> Option<&'static str> {
    Some(match id {
        1 => "system",
        2 => "user",
        3 => "api_key",
        4 => "router",
        _ => return None,
    })
}

pub fn activity_type(id: u64) -> Option<&'static str> {
    Some(match id {
        1 => "created",
        2 => "deleted",
        3 => "updated",
        4 => "requested",
        5 => "reported",
        6 => "logged in",
        7 => "logged out",
        8 => "registered",
        9 => "unregistered",
        10 => "activated",
        _ => return None,
    })
}

pub fn object_type(id: u64) -> Option<&'static str> {
    Some(match id {
        1 => "account",
        2 => "user",
        3 => "group",
        4 => "router",
        5 => "schedule",
        // 6 deprecated
        7 => "task",
        8 => "api_key",
        9 => "net_device",
        10 => "notifier",
        11 => "feature_binding",
        12 => "authorization",
        _ => return None,
    })
}

/// Value cache with a fixed time-to-live. Expired entries read as absent;
/// `invalidate` drops a single key.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash, V> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries
            .get(key)
            .and_then(|(stored, value)| (stored.elapsed() < self.ttl).then_some(value))
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, (Instant::now(), value));
    }

    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }
}

const NAME_CACHE_TTL: Duration = Duration::from_secs(300);

/// Resolves activity-log actor references to display names. A log page is
/// full of repeats, so results are cached; lookup failures degrade to the
/// raw id rather than aborting the listing.
pub struct NameResolver<'a> {
    client: &'a ApiClient,
    cache: TtlCache<(u64, u64), String>,
}

impl<'a> NameResolver<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self {
            client,
            cache: TtlCache::new(NAME_CACHE_TTL),
        }
    }

    pub fn actor(&mut self, kind: u64, id: u64) -> String {
        let key = (kind, id);
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let name = self.fetch(kind, id).unwrap_or_else(|err| {
            debug!(kind, id, %err, "actor lookup failed");
            id.to_string()
        });
        self.cache.insert(key, name.clone());
        name
    }

    fn fetch(&self, kind: u64, id: u64) -> Result<String> {
        match actor_type(kind) {
            Some("user") => {
                let user = self.client.get(&format!("users/{id}"), &[])?.data;
                let first = user.get("first_name").and_then(Value::as_str).unwrap_or("");
                let last = user.get("last_name").and_then(Value::as_str).unwrap_or("");
                Ok(format!("(user) {} {} ({id})", first, last))
            }
            Some("router") => {
                let router = self.client.get(&format!("routers/{id}"), &[])?.data;
                let name = router.get("name").and_then(Value::as_str).unwrap_or("?");
                Ok(format!("(router) {} ({id})", name))
            }
            Some(kind) => Ok(format!("({kind}) {id}")),
            None => Ok(id.to_string()),
        }
    }
}
