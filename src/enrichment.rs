//! Attribute enrichment: concurrent fan-out to the age, gender and
//! nationality sources under one deadline, and the merge policy that folds
//! the result into a caller's record.
//!
//! Enrichment is best-effort. [`Enricher::enrich`] always returns whatever
//! was obtained together with an [`AggregateError`] naming every source that
//! failed; callers must never fail a write because of it.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::lookup_client::{FetchError, LookupClient, LookupClientConfig};
use crate::models::{Attribute, Gender, NewPerson};
use crate::services::{AgeFetcher, GenderFetcher, NationalityFetcher};

pub const DEFAULT_ENRICHMENT_TIMEOUT: Duration = Duration::from_secs(2);

// ============ Call Context ============

/// Deadline and cancellation carried by one inbound call.
///
/// The enricher never waits past the caller's deadline, and cancelling the
/// token aborts every in-flight lookup.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The tighter of `now + timeout` and the caller's own deadline.
    fn bounded_deadline(&self, timeout: Duration) -> Instant {
        let own = Instant::now() + timeout;
        match self.deadline {
            Some(caller) => caller.min(own),
            None => own,
        }
    }
}

// ============ Results ============

/// Attributes obtained from the sources. `None` means unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentResult {
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub nationality: Option<String>,
}

impl EnrichmentResult {
    pub fn is_empty(&self) -> bool {
        self.age.is_none() && self.gender.is_none() && self.nationality.is_none()
    }
}

/// Set of per-source failures from one `enrich` call, keyed by attribute.
///
/// Iteration follows attribute order; that order carries no meaning about
/// which source failed first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateError {
    failures: BTreeMap<Attribute, FetchError>,
}

impl AggregateError {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn get(&self, attribute: Attribute) -> Option<&FetchError> {
        self.failures.get(&attribute)
    }

    pub fn contains(&self, attribute: Attribute) -> bool {
        self.failures.contains_key(&attribute)
    }

    pub fn failed_attributes(&self) -> impl Iterator<Item = Attribute> + '_ {
        self.failures.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Attribute, &FetchError)> {
        self.failures.iter().map(|(attr, err)| (*attr, err))
    }

    fn record(&mut self, attribute: Attribute, error: FetchError) {
        self.failures.insert(attribute, error);
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enrichment incomplete ({} failed)", self.failures.len())?;
        for (i, (attribute, error)) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}: {}", sep, attribute, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

// ============ Enricher ============

/// Immutable configuration for an [`Enricher`].
#[derive(Debug, Clone)]
pub struct EnricherConfig {
    pub age_api: Option<Url>,
    pub gender_api: Option<Url>,
    pub nationality_api: Option<Url>,
    /// Enrichment-wide bound on one `enrich` call.
    pub timeout: Duration,
    pub http: LookupClientConfig,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            age_api: None,
            gender_api: None,
            nationality_api: None,
            timeout: DEFAULT_ENRICHMENT_TIMEOUT,
            http: LookupClientConfig::default(),
        }
    }
}

/// Queries the three attribute sources concurrently and aggregates results.
///
/// Built once at startup and shared; it holds no per-call state.
#[derive(Clone)]
pub struct Enricher {
    age: AgeFetcher,
    gender: GenderFetcher,
    nationality: NationalityFetcher,
    timeout: Duration,
}

impl Enricher {
    /// Creates an enricher with a fresh HTTP connection pool.
    pub fn new(config: &EnricherConfig) -> Result<Self, reqwest::Error> {
        let client = LookupClient::new(&config.http)?;
        Ok(Self::with_client(client, config))
    }

    /// Creates an enricher whose sources share `client`.
    pub fn with_client(client: LookupClient, config: &EnricherConfig) -> Self {
        Self {
            age: AgeFetcher::new(client.clone(), config.age_api.clone()),
            gender: GenderFetcher::new(client.clone(), config.gender_api.clone()),
            nationality: NationalityFetcher::new(client, config.nationality_api.clone()),
            timeout: config.timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Attributes whose source has no endpoint configured.
    pub fn unconfigured(&self) -> Vec<Attribute> {
        let mut missing = Vec::new();
        if !self.age.is_configured() {
            missing.push(Attribute::Age);
        }
        if !self.gender.is_configured() {
            missing.push(Attribute::Gender);
        }
        if !self.nationality.is_configured() {
            missing.push(Attribute::Nationality);
        }
        missing
    }

    /// Looks up age, gender and nationality for `name`.
    ///
    /// All three lookups run as separate tasks and this call waits for all
    /// of them, bounded by the tighter of the enrichment timeout and the
    /// caller's deadline. A lookup still running at that point is dropped and
    /// reported as [`FetchError::DeadlineExceeded`]; one interrupted by the
    /// caller's token is reported as [`FetchError::Cancelled`].
    ///
    /// Returns `None` as the error only when every source succeeded.
    pub async fn enrich(
        &self,
        ctx: &CallContext,
        name: &str,
    ) -> (EnrichmentResult, Option<AggregateError>) {
        let started = Instant::now();
        let deadline = ctx.bounded_deadline(self.timeout);
        let token = ctx.cancellation_token().child_token();
        // Stops the spawned lookups if this future is dropped early.
        let _guard = token.clone().drop_guard();

        tracing::info!("Starting enrichment for: {}", name);

        let age = {
            let fetcher = self.age.clone();
            let name = name.to_string();
            tokio::spawn(bounded(deadline, token.clone(), async move {
                fetcher.fetch(&name).await
            }))
        };
        let gender = {
            let fetcher = self.gender.clone();
            let name = name.to_string();
            tokio::spawn(bounded(deadline, token.clone(), async move {
                fetcher.fetch(&name).await
            }))
        };
        let nationality = {
            let fetcher = self.nationality.clone();
            let name = name.to_string();
            tokio::spawn(bounded(deadline, token.clone(), async move {
                fetcher.fetch(&name).await
            }))
        };

        let (age, gender, nationality) = tokio::join!(age, gender, nationality);

        let mut result = EnrichmentResult::default();
        let mut failures = AggregateError::default();

        match settle(age) {
            Ok(age) => result.age = Some(age),
            Err(e) => failures.record(Attribute::Age, e),
        }
        match settle(gender) {
            Ok(gender) => result.gender = Some(gender),
            Err(e) => failures.record(Attribute::Gender, e),
        }
        match settle(nationality) {
            Ok(code) => result.nationality = Some(code),
            Err(e) => failures.record(Attribute::Nationality, e),
        }

        let elapsed_ms = started.elapsed().as_millis();
        if failures.is_empty() {
            tracing::info!(
                "Enriched '{}' in {}ms: {:?}",
                name,
                elapsed_ms,
                result
            );
            (result, None)
        } else {
            tracing::warn!(
                "Partial enrichment for '{}' in {}ms: {}",
                name,
                elapsed_ms,
                failures
            );
            (result, Some(failures))
        }
    }
}

/// Runs one lookup until it finishes, the token is cancelled, or the
/// deadline passes.
async fn bounded<T, F>(
    deadline: Instant,
    token: CancellationToken,
    lookup: F,
) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(FetchError::Cancelled),
        outcome = lookup => outcome,
        _ = tokio::time::sleep_until(deadline) => Err(FetchError::DeadlineExceeded),
    }
}

fn settle<T>(joined: Result<Result<T, FetchError>, JoinError>) -> Result<T, FetchError> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => Err(FetchError::Cancelled),
        Err(e) => Err(FetchError::TaskFailed(e.to_string())),
    }
}

// ============ Merge Policy ============

/// Fills the enrichable fields the caller left empty.
///
/// A field counts as empty when it is `None`, an age of zero, or a blank
/// nationality. Caller-supplied values always win; an empty field with no
/// enrichment value ends up `None`.
pub fn merge(mut record: NewPerson, enrichment: &EnrichmentResult) -> NewPerson {
    if record.age.map_or(true, |age| age == 0) {
        record.age = enrichment.age;
    }
    if record.gender.is_none() {
        record.gender = enrichment.gender;
    }
    if record
        .nationality
        .as_deref()
        .map_or(true, |n| n.trim().is_empty())
    {
        record.nationality = enrichment.nationality.clone();
    }
    record
}
