//! In-memory record service for testing
//!
//! Holds JSON records per model and evaluates domains against them, so the
//! dashboard can be exercised end to end without a backend. Failures and
//! latency can be injected, and every count query is logged.

use crate::error::{DashboardError, DashboardResult};
use crate::service::{GroupCount, ListOptions, Record, RecordQueryService};
use async_trait::async_trait;
use loadboard_core::{Condition, Domain, DomainValue, Model, Operator};
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use tokio::time::{Duration, sleep};

/// Mock record service for testing
#[derive(Debug, Default)]
pub struct MockRecordService {
    /// Records per model
    records: Mutex<HashMap<Model, Vec<Record>>>,

    /// Latency added to every call
    delay: Mutex<Option<Duration>>,

    /// Error message returned by every call while set
    failure: Mutex<Option<String>>,

    /// Domains passed to `count`
    counted: Mutex<Vec<(Model, Domain)>>,

    /// Number of calls served
    calls: AtomicUsize,
}

impl MockRecordService {
    /// Create an empty mock service
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add latency to every call
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(Some(delay));
        self
    }

    /// Fail every call with `message`
    #[must_use]
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.fail_with(message);
        self
    }

    /// Change the latency of subsequent calls
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Start failing calls with `message`
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Stop failing calls
    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Store a record; a missing `id` is assigned
    ///
    /// Non-object values are ignored.
    pub fn insert(&self, model: Model, record: Value) -> i64 {
        let Value::Object(mut record) = record else {
            return 0;
        };
        let mut records = self.records.lock();
        let table = records.entry(model).or_default();
        let id = match record.get("id").and_then(Value::as_i64) {
            Some(id) => id,
            None => {
                let next = table
                    .iter()
                    .filter_map(|r| r.get("id").and_then(Value::as_i64))
                    .max()
                    .unwrap_or(0)
                    + 1;
                record.insert("id".to_string(), Value::from(next));
                next
            }
        };
        table.retain(|r| r.get("id").and_then(Value::as_i64) != Some(id));
        table.push(record);
        id
    }

    /// Set one field of a stored record
    pub fn update(&self, model: Model, id: i64, field: &str, value: Value) -> bool {
        let mut records = self.records.lock();
        records
            .get_mut(&model)
            .and_then(|table| {
                table
                    .iter_mut()
                    .find(|r| r.get("id").and_then(Value::as_i64) == Some(id))
            })
            .map(|record| record.insert(field.to_string(), value))
            .is_some()
    }

    /// Remove a stored record
    pub fn remove(&self, model: Model, id: i64) {
        if let Some(table) = self.records.lock().get_mut(&model) {
            table.retain(|r| r.get("id").and_then(Value::as_i64) != Some(id));
        }
    }

    /// Domains passed to `count`, in call order
    #[must_use]
    pub fn counted_domains(&self) -> Vec<(Model, Domain)> {
        self.counted.lock().clone()
    }

    /// Number of calls served so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    async fn enter(&self) -> DashboardResult<()> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        match self.failure.lock().clone() {
            Some(message) => Err(DashboardError::backend(message)),
            None => Ok(()),
        }
    }

    fn matching(&self, model: Model, domain: &Domain) -> Vec<Record> {
        self.records.lock()
            .get(&model)
            .map(|table| {
                table
                    .iter()
                    .filter(|record| matches_domain(record, domain))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Field value with relations reduced to their id and `null` read as `false`
fn scalar(record: &Record, field: &str) -> Value {
    match record.get(field) {
        None | Some(Value::Null) => Value::Bool(false),
        Some(Value::Array(pair)) if pair.len() == 2 && pair.first().is_some_and(Value::is_i64) => {
            pair.first().cloned().unwrap_or(Value::Bool(false))
        }
        Some(value) => value.clone(),
    }
}

fn value_eq(left: &Value, right: &DomainValue) -> bool {
    match (left, right) {
        (Value::Bool(a), DomainValue::Bool(b)) => a == b,
        (Value::Number(a), DomainValue::Int(b)) => a.as_i64() == Some(*b),
        (Value::Number(a), DomainValue::Float(b)) => a.as_f64() == Some(*b),
        (Value::String(a), DomainValue::Text(b)) => a == b,
        (Value::String(a), DomainValue::Int(b)) => a.parse::<i64>().ok() == Some(*b),
        _ => false,
    }
}

fn value_cmp(left: &Value, right: &DomainValue) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), DomainValue::Int(b)) => a.as_i64().map(|a| a.cmp(b)),
        (Value::Number(a), DomainValue::Float(b)) => a.as_f64().and_then(|a| a.partial_cmp(b)),
        (Value::String(a), DomainValue::Text(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    }
}

fn matches_condition(record: &Record, condition: &Condition) -> bool {
    let value = scalar(record, &condition.field);
    match (condition.operator, &condition.value) {
        (Operator::Eq, expected) => value_eq(&value, expected),
        (Operator::Ne, expected) => !value_eq(&value, expected),
        (Operator::Ge, bound) => value_cmp(&value, bound).is_some_and(Ordering::is_ge),
        (Operator::Le, bound) => value_cmp(&value, bound).is_some_and(Ordering::is_le),
        (Operator::In, DomainValue::List(items)) => items.iter().any(|item| value_eq(&value, item)),
        (Operator::NotIn, DomainValue::List(items)) => {
            !items.iter().any(|item| value_eq(&value, item))
        }
        (Operator::In | Operator::NotIn, _) => false,
    }
}

/// True when `record` satisfies every condition of `domain`
#[must_use]
pub fn matches_domain(record: &Record, domain: &Domain) -> bool {
    domain
        .conditions()
        .iter()
        .all(|condition| matches_condition(record, condition))
}

fn order_key(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(false), Value::Bool(false)) => Ordering::Equal,
        (Value::Bool(false), _) => Ordering::Less,
        (_, Value::Bool(false)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn project(record: &Record, fields: &[&str]) -> Record {
    let mut out = Record::new();
    if let Some(id) = record.get("id") {
        out.insert("id".to_string(), id.clone());
    }
    for field in fields {
        let value = record.get(*field).cloned().unwrap_or(Value::Bool(false));
        out.insert((*field).to_string(), value);
    }
    out
}

#[async_trait]
impl RecordQueryService for MockRecordService {
    async fn count(&self, model: Model, domain: &Domain) -> DashboardResult<u64> {
        self.enter().await?;
        self.counted.lock().push((model, domain.clone()));
        Ok(self.matching(model, domain).len() as u64)
    }

    async fn search_read(
        &self,
        model: Model,
        domain: &Domain,
        fields: &[&str],
        options: &ListOptions,
    ) -> DashboardResult<Vec<Record>> {
        self.enter().await?;
        let mut records = self.matching(model, domain);

        if let Some(order) = options.order.as_deref() {
            let mut parts = order.split_whitespace();
            let field = parts.next().unwrap_or("id");
            let descending = parts.next().is_some_and(|dir| dir.eq_ignore_ascii_case("desc"));
            records.sort_by(|a, b| {
                let ordering = order_key(&scalar(a, field), &scalar(b, field))
                    .then_with(|| order_key(&scalar(a, "id"), &scalar(b, "id")));
                if descending { ordering.reverse() } else { ordering }
            });
        }
        if let Some(limit) = options.limit {
            records.truncate(limit);
        }

        Ok(records.iter().map(|record| project(record, fields)).collect())
    }

    async fn read_group(
        &self,
        model: Model,
        domain: &Domain,
        group_by: &str,
    ) -> DashboardResult<Vec<GroupCount>> {
        self.enter().await?;
        let mut groups: Vec<GroupCount> = Vec::new();
        for record in self.matching(model, domain) {
            let key = match record.get(group_by) {
                None | Some(Value::Null) => Value::Bool(false),
                Some(value) => value.clone(),
            };
            match groups.iter_mut().find(|group| group.key == key) {
                Some(group) => group.count += 1,
                None => groups.push(GroupCount { key, count: 1 }),
            }
        }
        Ok(groups)
    }

    async fn read_by_ids(
        &self,
        model: Model,
        ids: &[i64],
        fields: &[&str],
    ) -> DashboardResult<Vec<Record>> {
        self.enter().await?;
        let records = self.records.lock();
        Ok(ids
            .iter()
            .filter_map(|id| {
                records.get(&model)?.iter().find(|r| {
                    r.get("id").and_then(Value::as_i64) == Some(*id)
                })
            })
            .map(|record| project(record, fields))
            .collect())
    }

    async fn sum(&self, model: Model, domain: &Domain, field: &str) -> DashboardResult<f64> {
        self.enter().await?;
        Ok(self
            .matching(model, domain)
            .iter()
            .filter_map(|record| record.get(field).and_then(Value::as_f64))
            .sum())
    }
}
