//! In-memory directory used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dirsrv_core::config::DirectoryConfig;
use dirsrv_objects::entry::{AttributeMap, Entry};
use dirsrv_objects::filter::Filter;
use dirsrv_objects::protocol::{
    DirectoryClient, DirectoryModification, Page, PageControl, ProtocolError, ProtocolResult,
    SearchRequest, SearchScope, RC_ALREADY_EXISTS, RC_NO_SUCH_OBJECT,
};
use dirsrv_objects::{DistinguishedName, Session};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

const RC_NO_SUCH_ATTRIBUTE: u32 = 16;
const RC_ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
const RC_NOT_ALLOWED_ON_NON_LEAF: u32 = 66;

/// Requests received, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub searches: usize,
    pub pages: usize,
    pub adds: usize,
    pub modifies: usize,
    pub deletes: usize,
    pub renames: usize,
}

impl Counters {
    pub fn mutations(&self) -> usize {
        self.adds + self.modifies + self.deletes + self.renames
    }
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, Entry>,
    counters: Counters,
}

/// Cloneable directory; clones share the same tree, so a test keeps one clone for inspection
/// while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory holding `dc=example,dc=com` and its `ou=People` and `ou=Groups` containers.
    pub fn with_suffix() -> Self {
        let directory = Self::new();
        directory.seed("dc=example,dc=com", &[("objectClass", "domain"), ("dc", "example")]);
        for ou in ["People", "Groups"] {
            directory.seed(
                &format!("ou={ou},dc=example,dc=com"),
                &[("objectClass", "organizationalUnit"), ("ou", ou)],
            );
        }
        directory
    }

    /// Stores an entry without counting a request.
    pub fn seed(&self, dn: &str, attributes: &[(&str, &str)]) {
        let dn = DistinguishedName::parse(dn).unwrap();
        let mut map = AttributeMap::new();
        for (name, value) in attributes {
            map.push(name, *value);
        }
        self.lock().entries.insert(dn.normalized(), Entry::new(dn, map));
    }

    pub fn entry(&self, dn: &str) -> Option<Entry> {
        let key = DistinguishedName::parse(dn).unwrap().normalized();
        self.lock().entries.get(&key).cloned()
    }

    pub fn counters(&self) -> Counters {
        self.lock().counters
    }

    pub fn session(&self) -> Arc<Session> {
        Session::from_client(
            DirectoryConfig::new("ldap://localhost:389").unwrap(),
            Box::new(self.clone()),
        )
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn matching(&self, request: &SearchRequest) -> ProtocolResult<Vec<Entry>> {
        let base = parse_dn(&request.base)?;
        let filter = Filter::parse(&request.filter)
            .map_err(|err| result(2, &format!("bad filter: {err}")))?;
        let state = self.lock();
        if !state.entries.contains_key(&base.normalized()) {
            return Err(result(RC_NO_SUCH_OBJECT, &request.base));
        }
        Ok(state
            .entries
            .values()
            .filter(|entry| in_scope(&entry.dn, &base, request.scope))
            .filter(|entry| evaluate(&filter, &entry.attributes))
            .map(|entry| project(entry, &request.attributes))
            .collect())
    }
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    async fn simple_bind(&mut self, _dn: &str, _password: &str) -> ProtocolResult<()> {
        Ok(())
    }

    async fn search(&mut self, request: &SearchRequest) -> ProtocolResult<Vec<Entry>> {
        self.lock().counters.searches += 1;
        self.matching(request)
    }

    async fn search_page(
        &mut self,
        request: &SearchRequest,
        control: &PageControl,
    ) -> ProtocolResult<Page> {
        self.lock().counters.pages += 1;
        let offset = if control.cookie.is_empty() {
            0
        } else {
            String::from_utf8_lossy(&control.cookie)
                .parse::<usize>()
                .map_err(|_| result(2, "bad cookie"))?
        };
        let all = self.matching(request)?;
        let end = (offset + control.size as usize).min(all.len());
        let cookie = if end < all.len() {
            end.to_string().into_bytes()
        } else {
            Vec::new()
        };
        Ok(Page {
            entries: all[offset.min(end)..end].to_vec(),
            cookie,
        })
    }

    async fn add(&mut self, dn: &str, attributes: &AttributeMap) -> ProtocolResult<()> {
        let dn = parse_dn(dn)?;
        let mut state = self.lock();
        state.counters.adds += 1;
        let key = dn.normalized();
        if state.entries.contains_key(&key) {
            return Err(result(RC_ALREADY_EXISTS, dn.as_str()));
        }
        state.entries.insert(key, Entry::new(dn, attributes.clone()));
        Ok(())
    }

    async fn modify(
        &mut self,
        dn: &str,
        modifications: &[DirectoryModification],
    ) -> ProtocolResult<()> {
        let key = parse_dn(dn)?.normalized();
        let mut state = self.lock();
        state.counters.modifies += 1;
        let Some(current) = state.entries.get(&key) else {
            return Err(result(RC_NO_SUCH_OBJECT, dn));
        };
        let mut attributes = current.attributes.clone();
        for modification in modifications {
            apply(&mut attributes, modification)?;
        }
        if let Some(entry) = state.entries.get_mut(&key) {
            entry.attributes = attributes;
        }
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> ProtocolResult<()> {
        let target = parse_dn(dn)?;
        let mut state = self.lock();
        state.counters.deletes += 1;
        if !state.entries.contains_key(&target.normalized()) {
            return Err(result(RC_NO_SUCH_OBJECT, dn));
        }
        if state
            .entries
            .values()
            .any(|entry| entry.dn.is_descendant_of(&target))
        {
            return Err(result(RC_NOT_ALLOWED_ON_NON_LEAF, dn));
        }
        state.entries.remove(&target.normalized());
        Ok(())
    }

    async fn rename(
        &mut self,
        dn: &str,
        new_rdn: &str,
        new_superior: Option<String>,
        delete_old_rdn: bool,
    ) -> ProtocolResult<()> {
        let source = parse_dn(dn)?;
        let superior = new_superior.as_deref().map(parse_dn).transpose()?;
        let target = source
            .renamed(new_rdn, superior.as_ref())
            .map_err(|err| result(34, &err.to_string()))?;
        let mut state = self.lock();
        state.counters.renames += 1;
        if state.entries.contains_key(&target.normalized()) {
            return Err(result(RC_ALREADY_EXISTS, target.as_str()));
        }
        let Some(mut entry) = state.entries.remove(&source.normalized()) else {
            return Err(result(RC_NO_SUCH_OBJECT, dn));
        };
        if delete_old_rdn {
            for rdn in source.first_rdn() {
                remove_value(&mut entry.attributes, rdn.attribute(), rdn.value());
            }
        }
        for rdn in target.first_rdn() {
            if !has_value(&entry.attributes, rdn.attribute(), rdn.value()) {
                entry.attributes.push(rdn.attribute(), rdn.value());
            }
        }
        entry.dn = target.clone();
        state.entries.insert(target.normalized(), entry);
        Ok(())
    }

    async fn unbind(&mut self) -> ProtocolResult<()> {
        Ok(())
    }
}

fn result(code: u32, message: &str) -> ProtocolError {
    ProtocolError::Result {
        code,
        message: message.to_string(),
    }
}

fn parse_dn(dn: &str) -> ProtocolResult<DistinguishedName> {
    DistinguishedName::parse(dn).map_err(|err| result(34, &err.to_string()))
}

fn in_scope(dn: &DistinguishedName, base: &DistinguishedName, scope: SearchScope) -> bool {
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::OneLevel => dn.parent().as_ref() == Some(base),
        SearchScope::Subtree => dn == base || dn.is_descendant_of(base),
    }
}

fn project(entry: &Entry, requested: &[String]) -> Entry {
    if requested.is_empty() || requested.iter().any(|name| name == "*") {
        return entry.clone();
    }
    let mut attributes = AttributeMap::new();
    for name in requested {
        if let Some(values) = entry.attributes.get(name) {
            attributes.insert(name, values.to_vec());
        }
    }
    Entry::new(entry.dn.clone(), attributes)
}

fn has_value(attributes: &AttributeMap, name: &str, value: &str) -> bool {
    attributes
        .get(name)
        .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value)))
}

fn remove_value(attributes: &mut AttributeMap, name: &str, value: &str) -> bool {
    let Some(mut values) = attributes.remove(name) else {
        return false;
    };
    let before = values.len();
    values.retain(|v| !v.eq_ignore_ascii_case(value));
    let removed = values.len() != before;
    if !values.is_empty() {
        attributes.insert(name, values);
    }
    removed
}

fn apply(attributes: &mut AttributeMap, modification: &DirectoryModification) -> ProtocolResult<()> {
    let name = modification.attribute();
    match modification {
        DirectoryModification::Add { values, .. } => {
            for value in values {
                if has_value(attributes, name, value) {
                    return Err(result(RC_ATTRIBUTE_OR_VALUE_EXISTS, name));
                }
                attributes.push(name, value.clone());
            }
        }
        DirectoryModification::Delete { values, .. } if values.is_empty() => {
            if attributes.remove(name).is_none() {
                return Err(result(RC_NO_SUCH_ATTRIBUTE, name));
            }
        }
        DirectoryModification::Delete { values, .. } => {
            for value in values {
                if !remove_value(attributes, name, value) {
                    return Err(result(RC_NO_SUCH_ATTRIBUTE, name));
                }
            }
        }
        DirectoryModification::Replace { values, .. } => {
            attributes.remove(name);
            if !values.is_empty() {
                attributes.insert(name, values.clone());
            }
        }
    }
    Ok(())
}

fn evaluate(filter: &Filter, attributes: &AttributeMap) -> bool {
    match filter {
        Filter::And(filters) => filters.iter().all(|f| evaluate(f, attributes)),
        Filter::Or(filters) => filters.iter().any(|f| evaluate(f, attributes)),
        Filter::Not(inner) => !evaluate(inner, attributes),
        Filter::Present(attribute) => {
            attribute.eq_ignore_ascii_case("objectclass") || !values(attributes, attribute).is_empty()
        }
        Filter::Equality { attribute, value } | Filter::Approx { attribute, value } => {
            has_value(attributes, attribute, value)
        }
        Filter::Substring {
            attribute,
            initial,
            any,
            last,
        } => values(attributes, attribute).iter().any(|candidate| {
            substring_match(
                &candidate.to_lowercase(),
                initial.as_deref(),
                any,
                last.as_deref(),
            )
        }),
        Filter::Ordering {
            attribute,
            greater,
            value,
        } => values(attributes, attribute).iter().any(|candidate| {
            let ordering = match (candidate.parse::<i64>(), value.parse::<i64>()) {
                (Ok(left), Ok(right)) => left.cmp(&right),
                _ => candidate.to_lowercase().cmp(&value.to_lowercase()),
            };
            if *greater {
                ordering.is_ge()
            } else {
                ordering.is_le()
            }
        }),
    }
}

fn values<'a>(attributes: &'a AttributeMap, name: &str) -> &'a [String] {
    attributes.get(name).unwrap_or_default()
}

fn substring_match(candidate: &str, initial: Option<&str>, any: &[String], last: Option<&str>) -> bool {
    let mut rest = candidate;
    if let Some(initial) = initial {
        match rest.strip_prefix(initial.to_lowercase().as_str()) {
            Some(stripped) => rest = stripped,
            None => return false,
        }
    }
    for middle in any {
        let middle = middle.to_lowercase();
        match rest.find(middle.as_str()) {
            Some(index) => rest = &rest[index + middle.len()..],
            None => return false,
        }
    }
    last.map_or(true, |last| rest.ends_with(last.to_lowercase().as_str()))
}
