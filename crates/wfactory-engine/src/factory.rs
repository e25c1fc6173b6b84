use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use wfactory_graph::{MaterializeNotifier, TracingNotifier, materialize};
use wfactory_source::{SourceError, TemplateSource};
use wfactory_template::Template;

use crate::config::FactoryConfig;
use crate::error::FactoryError;
use crate::ledger::{InstanceLedger, InstanceRecord, LedgerSnapshot};
use crate::store::{LoadState, PendingLoad, TemplateStore, WorkflowEntry};

/// Caches templates and materializes instances of them into per-template
/// ledgers.
///
/// Generic over `N: MaterializeNotifier` to choose where materialization
/// events go. `WorkflowFactory::new()` logs them through `tracing`.
pub struct WorkflowFactory<N: MaterializeNotifier = TracingNotifier> {
  source: Arc<dyn TemplateSource>,
  config: FactoryConfig,
  notifier: N,
  store: TemplateStore,
}

impl WorkflowFactory<TracingNotifier> {
  pub fn new(
    source: impl TemplateSource + 'static,
    config: FactoryConfig,
  ) -> Result<Self, FactoryError> {
    Self::with_notifier(source, config, TracingNotifier)
  }
}

impl<N: MaterializeNotifier> WorkflowFactory<N> {
  /// Create a factory with a custom notifier.
  pub fn with_notifier(
    source: impl TemplateSource + 'static,
    config: FactoryConfig,
    notifier: N,
  ) -> Result<Self, FactoryError> {
    config.validate()?;
    Ok(Self {
      source: Arc::new(source),
      config,
      notifier,
      store: TemplateStore::default(),
    })
  }

  /// Names of the templates currently cached.
  pub fn cached_templates(&self) -> Vec<String> {
    self.store.ready_names()
  }

  /// Fetch a template, loading and caching it on first use.
  pub async fn get_template(&self, name: &str) -> Result<Arc<Template>, FactoryError> {
    self
      .get_template_with_cancel(name, CancellationToken::new())
      .await
  }

  /// Fetch a template, giving up when `cancel` fires.
  ///
  /// Concurrent first requests share one load. Cancelling or timing out
  /// only stops this caller from waiting; the load itself carries on and
  /// still populates the cache.
  #[instrument(name = "get_template", skip(self, name, cancel), fields(template = %name))]
  pub async fn get_template_with_cancel(
    &self,
    name: &str,
    cancel: CancellationToken,
  ) -> Result<Arc<Template>, FactoryError> {
    let entry = self.store.entry(name);

    let pending = {
      let mut state = entry.lock();
      let in_flight = match &state.load {
        LoadState::Ready(template) => {
          debug!("template cache hit");
          return Ok(template.clone());
        }
        LoadState::Loading { pending, .. } => Some(pending.clone()),
        LoadState::Absent | LoadState::Failed(_) => None,
      };

      match in_flight {
        Some(pending) => {
          debug!("joining in-flight load");
          pending
        }
        None => {
          state.generation += 1;
          let generation = state.generation;
          let pending = self.start_load(name, entry.clone(), generation);
          state.load = LoadState::Loading {
            generation,
            pending: pending.clone(),
          };
          pending
        }
      }
    };

    self.wait_for_load(name, pending, cancel).await
  }

  /// Materialize a new instance of a loaded template and record it in the
  /// template's ledger. Returns the slot the instance was assigned.
  ///
  /// The template must have been fetched with [`get_template`] first. A
  /// load that is still in flight is waited for.
  ///
  /// [`get_template`]: WorkflowFactory::get_template
  pub async fn create_instance(&self, name: &str, base_url: &str) -> Result<usize, FactoryError> {
    self
      .create_instance_with_cancel(name, base_url, CancellationToken::new())
      .await
  }

  #[instrument(
    name = "create_instance",
    skip(self, name, cancel),
    fields(template = %name)
  )]
  pub async fn create_instance_with_cancel(
    &self,
    name: &str,
    base_url: &str,
    cancel: CancellationToken,
  ) -> Result<usize, FactoryError> {
    let not_loaded = || FactoryError::TemplateNotLoaded {
      name: name.to_string(),
    };

    let entry = self.store.get(name).ok_or_else(not_loaded)?;

    let pending = {
      let state = entry.lock();
      match &state.load {
        LoadState::Ready(template) => Ok(template.clone()),
        LoadState::Loading { pending, .. } => Err(pending.clone()),
        LoadState::Absent | LoadState::Failed(_) => return Err(not_loaded()),
      }
    };

    let template = match pending {
      Ok(template) => template,
      Err(pending) => self.wait_for_load(name, pending, cancel).await?,
    };

    let reservation = {
      let mut state = entry.lock();
      state
        .ledger
        .get_or_insert_with(|| InstanceLedger::new(self.config.ledger_capacity))
        .reserve()
    };
    debug!(
      slot = reservation.slot,
      sequence = reservation.sequence,
      "assigned ledger slot"
    );

    let root_uri = format!("{base_url}/workflow/{name}/instances/{}", reservation.slot);
    let instance = materialize(template.detached(), &root_uri, &self.notifier);

    let record = Arc::new(InstanceRecord {
      slot: reservation.slot,
      sequence: reservation.sequence,
      created_at: Utc::now(),
      instance,
    });

    let published = {
      let mut state = entry.lock();
      state
        .ledger
        .as_mut()
        .is_some_and(|ledger| ledger.publish(record.clone()))
    };

    if published {
      info!(
        slot = record.slot,
        sequence = record.sequence,
        jobs = record.instance.jobs.len(),
        data = record.instance.data.len(),
        uri = %record.instance.uri,
        "created instance"
      );
    } else {
      warn!(
        slot = record.slot,
        sequence = record.sequence,
        "instance superseded by a newer creation before publishing"
      );
    }

    Ok(reservation.slot)
  }

  /// Get the instance stored at `slot` of a template's ledger.
  pub fn get_instance(&self, name: &str, slot: usize) -> Result<Arc<InstanceRecord>, FactoryError> {
    self
      .with_ledger(name, |ledger| ledger.get(slot))?
      .ok_or_else(|| FactoryError::IndexNotFound {
        name: name.to_string(),
        slot,
      })
  }

  /// Snapshot every slot of a template's ledger.
  pub fn get_instance_list(&self, name: &str) -> Result<LedgerSnapshot, FactoryError> {
    self.with_ledger(name, |ledger| ledger.snapshot(name))
  }

  fn with_ledger<T>(
    &self,
    name: &str,
    f: impl FnOnce(&InstanceLedger) -> T,
  ) -> Result<T, FactoryError> {
    let not_found = || FactoryError::NotFound {
      name: name.to_string(),
    };
    let entry = self.store.get(name).ok_or_else(not_found)?;
    let state = entry.lock();
    state.ledger.as_ref().map(f).ok_or_else(not_found)
  }

  /// Spawn a load for `name`. The spawned task records the outcome on the
  /// entry before the returned future resolves. If the task dies first, the
  /// first waiter records the failure instead.
  fn start_load(&self, name: &str, entry: Arc<WorkflowEntry>, generation: u64) -> PendingLoad {
    info!(template = %name, "loading template");

    let source = self.source.clone();
    let capacity = self.config.ledger_capacity;
    let task_name = name.to_string();
    let task_entry = entry.clone();

    let handle = tokio::spawn(async move {
      let result = source.load(&task_name).await.map(Arc::new);
      record_outcome(&task_entry, &task_name, generation, &result, capacity);
      result
    });

    let name = name.to_string();
    async move {
      match handle.await {
        Ok(result) => result,
        Err(e) => {
          let result = Err(SourceError::Io {
            name: name.clone(),
            message: format!("load task failed: {e}"),
          });
          record_outcome(&entry, &name, generation, &result, capacity);
          result
        }
      }
    }
    .boxed()
    .shared()
  }

  async fn wait_for_load(
    &self,
    name: &str,
    pending: PendingLoad,
    cancel: CancellationToken,
  ) -> Result<Arc<Template>, FactoryError> {
    let timeout = self.config.load_timeout();

    tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(FactoryError::Cancelled),
      result = tokio::time::timeout(timeout, pending) => match result {
        Ok(loaded) => loaded.map_err(FactoryError::from),
        Err(_) => {
          warn!(template = %name, timeout_ms = self.config.load_timeout_ms, "gave up waiting for template load");
          Err(FactoryError::LoadTimeout {
            name: name.to_string(),
            timeout_ms: self.config.load_timeout_ms,
          })
        }
      },
    }
  }
}

/// Publish the result of load `generation`, unless the entry has already
/// moved past that load.
fn record_outcome(
  entry: &WorkflowEntry,
  name: &str,
  generation: u64,
  result: &Result<Arc<Template>, SourceError>,
  capacity: usize,
) {
  let mut state = entry.lock();
  let current = matches!(
    state.load,
    LoadState::Loading { generation: g, .. } if g == generation
  );
  if !current {
    debug!(template = %name, generation, "discarding stale load outcome");
    return;
  }

  match result {
    Ok(template) => {
      info!(
        template = %name,
        jobs = template.jobs.len(),
        children = template.children.len(),
        "template loaded"
      );
      state.load = LoadState::Ready(template.clone());
      state
        .ledger
        .get_or_insert_with(|| InstanceLedger::new(capacity));
    }
    Err(e) => {
      warn!(template = %name, error = %e, "template load failed");
      state.load = LoadState::Failed(e.clone());
    }
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  use async_trait::async_trait;
  use futures::future::join_all;
  use wfactory_graph::{ChannelNotifier, MaterializeEvent};
  use wfactory_template::{ChildDescriptor, JobDescriptor, UsageDeclaration};

  use super::*;

  const BASE: &str = "http://localhost:8080";

  /// In-memory source that counts loads and can be slowed down.
  #[derive(Clone, Default)]
  struct MockSource {
    templates: Arc<HashMap<String, Template>>,
    loads: Arc<AtomicUsize>,
    delay: Duration,
    panic_on_first_load: bool,
  }

  impl MockSource {
    fn with(templates: Vec<Template>) -> Self {
      Self {
        templates: Arc::new(templates.into_iter().map(|t| (t.name.clone(), t)).collect()),
        ..Default::default()
      }
    }

    fn delayed(mut self, delay: Duration) -> Self {
      self.delay = delay;
      self
    }

    fn panicking_once(mut self) -> Self {
      self.panic_on_first_load = true;
      self
    }

    fn loads(&self) -> usize {
      self.loads.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl TemplateSource for MockSource {
    async fn load(&self, name: &str) -> Result<Template, SourceError> {
      let previous = self.loads.fetch_add(1, Ordering::SeqCst);
      if self.panic_on_first_load && previous == 0 {
        panic!("source crashed while loading {name}");
      }
      if !self.delay.is_zero() {
        tokio::time::sleep(self.delay).await;
      }
      self
        .templates
        .get(name)
        .cloned()
        .ok_or_else(|| SourceError::NotFound {
          name: name.to_string(),
          path: "memory".to_string(),
        })
    }
  }

  fn pipeline() -> Template {
    let mut template = Template::new("pipeline");
    template.jobs = vec![
      JobDescriptor::new("J1", "produce").with_usage(UsageDeclaration::output("f1", 100)),
      JobDescriptor::new("J2", "consume").with_usage(UsageDeclaration::input("f1", 100)),
    ];
    template.children = vec![ChildDescriptor::new("J2", ["J1"])];
    template
  }

  fn factory(source: MockSource) -> WorkflowFactory<TracingNotifier> {
    WorkflowFactory::new(source, FactoryConfig::default()).unwrap()
  }

  #[tokio::test]
  async fn test_concurrent_first_fetches_share_one_load() {
    let source = MockSource::with(vec![pipeline()]).delayed(Duration::from_millis(50));
    let factory = factory(source.clone());

    let results = join_all((0..8).map(|_| factory.get_template("pipeline"))).await;
    let templates: Vec<Arc<Template>> = results.into_iter().map(Result::unwrap).collect();

    assert_eq!(source.loads(), 1);
    assert!(templates.iter().all(|t| Arc::ptr_eq(t, &templates[0])));
  }

  #[tokio::test]
  async fn test_cached_template_is_returned_without_reloading() {
    let source = MockSource::with(vec![pipeline()]);
    let factory = factory(source.clone());

    let first = factory.get_template("pipeline").await.unwrap();
    let second = factory.get_template("pipeline").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(source.loads(), 1);
    assert_eq!(factory.cached_templates(), vec!["pipeline"]);
  }

  #[tokio::test]
  async fn test_missing_template_is_not_found_and_retried() {
    let source = MockSource::with(vec![]);
    let factory = factory(source.clone());

    let err = factory.get_template("ghost").await.unwrap_err();
    assert!(matches!(err, FactoryError::NotFound { ref name } if name == "ghost"));

    // Failed loads are not cached.
    let _ = factory.get_template("ghost").await;
    assert_eq!(source.loads(), 2);
    assert!(factory.cached_templates().is_empty());
  }

  #[tokio::test]
  async fn test_create_before_fetch_is_not_loaded() {
    let factory = factory(MockSource::with(vec![pipeline()]));

    let err = factory.create_instance("pipeline", BASE).await.unwrap_err();
    assert!(matches!(err, FactoryError::TemplateNotLoaded { .. }));
  }

  #[tokio::test]
  async fn test_create_after_failed_fetch_is_not_loaded() {
    let factory = factory(MockSource::with(vec![]));

    let _ = factory.get_template("ghost").await;
    let err = factory.create_instance("ghost", BASE).await.unwrap_err();
    assert!(matches!(err, FactoryError::TemplateNotLoaded { .. }));
  }

  #[tokio::test]
  async fn test_create_waits_for_in_flight_load() {
    let source = MockSource::with(vec![pipeline()]).delayed(Duration::from_millis(30));
    let factory = factory(source.clone());

    let (template, slot) = tokio::join!(
      factory.get_template("pipeline"),
      async {
        tokio::task::yield_now().await;
        factory.create_instance("pipeline", BASE).await
      }
    );

    assert!(template.is_ok());
    assert_eq!(slot.unwrap(), 0);
    assert_eq!(source.loads(), 1);
  }

  #[tokio::test]
  async fn test_create_materializes_at_slot_uri() {
    let factory = factory(MockSource::with(vec![pipeline()]));
    factory.get_template("pipeline").await.unwrap();

    let slot = factory.create_instance("pipeline", BASE).await.unwrap();
    let record = factory.get_instance("pipeline", slot).unwrap();

    assert_eq!(record.slot, 0);
    assert_eq!(record.sequence, 1);
    assert_eq!(
      record.instance.uri,
      "http://localhost:8080/workflow/pipeline/instances/0"
    );
    assert_eq!(
      record.instance.jobs[1].uri,
      "http://localhost:8080/workflow/pipeline/instances/0/task-2"
    );
    assert_eq!(record.instance.data.len(), 1);
    assert_eq!(record.instance.data[0].from[0].job_name, "produce");
    assert_eq!(record.instance.data[0].to[0].job_name, "consume");
  }

  #[tokio::test]
  async fn test_slots_wrap_around_capacity() {
    let factory = factory(MockSource::with(vec![pipeline()]));
    factory.get_template("pipeline").await.unwrap();

    let mut slots = Vec::new();
    for _ in 0..4 {
      slots.push(factory.create_instance("pipeline", BASE).await.unwrap());
    }
    assert_eq!(slots, vec![0, 1, 2, 0]);

    let record = factory.get_instance("pipeline", 0).unwrap();
    assert_eq!(record.sequence, 4);

    let snapshot = factory.get_instance_list("pipeline").unwrap();
    assert_eq!(snapshot.current, 0);
    assert_eq!(snapshot.capacity, 3);
    assert_eq!(snapshot.created, 4);
    assert_eq!(snapshot.occupied().count(), 3);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_concurrent_creations_get_distinct_slots() {
    let factory = Arc::new(factory(MockSource::with(vec![pipeline()])));
    factory.get_template("pipeline").await.unwrap();

    let handles: Vec<_> = (0..30)
      .map(|_| {
        let factory = factory.clone();
        tokio::spawn(async move { factory.create_instance("pipeline", BASE).await })
      })
      .collect();
    for handle in handles {
      handle.await.unwrap().unwrap();
    }

    let snapshot = factory.get_instance_list("pipeline").unwrap();
    assert_eq!(snapshot.created, 30);

    let mut sequences = Vec::new();
    for record in snapshot.occupied() {
      assert_eq!(record.slot as u64, (record.sequence - 1) % 3);
      assert!(
        record
          .instance
          .uri
          .ends_with(&format!("/instances/{}", record.slot))
      );
      sequences.push(record.sequence);
    }
    sequences.sort();
    assert_eq!(sequences, vec![28, 29, 30]);
  }

  #[tokio::test]
  async fn test_crashed_load_fails_and_is_retried() {
    let source = MockSource::with(vec![pipeline()]).panicking_once();
    let factory = factory(source.clone());

    let err = factory.get_template("pipeline").await.unwrap_err();
    assert!(matches!(err, FactoryError::Io { .. }));
    assert!(factory.cached_templates().is_empty());

    factory.get_template("pipeline").await.unwrap();
    assert_eq!(source.loads(), 2);
  }

  #[test]
  fn test_stale_load_outcome_is_discarded() {
    let store = TemplateStore::default();
    let entry = store.entry("pipeline");
    let template = Arc::new(pipeline());
    {
      let mut state = entry.lock();
      state.generation = 2;
      state.load = LoadState::Ready(template.clone());
    }

    let failure = Err(SourceError::Io {
      name: "pipeline".to_string(),
      message: "load task failed".to_string(),
    });
    record_outcome(&entry, "pipeline", 1, &failure, 3);

    let state = entry.lock();
    assert!(matches!(&state.load, LoadState::Ready(t) if Arc::ptr_eq(t, &template)));
  }

  #[tokio::test]
  async fn test_creating_instances_leaves_template_untouched() {
    let factory = factory(MockSource::with(vec![pipeline()]));
    let template = factory.get_template("pipeline").await.unwrap();
    let before = (*template).clone();

    for _ in 0..5 {
      factory.create_instance("pipeline", BASE).await.unwrap();
    }

    assert_eq!(*factory.get_template("pipeline").await.unwrap(), before);
  }

  #[tokio::test]
  async fn test_instance_lookup_errors() {
    let factory = factory(MockSource::with(vec![pipeline()]));

    assert!(matches!(
      factory.get_instance("pipeline", 0),
      Err(FactoryError::NotFound { .. })
    ));
    assert!(matches!(
      factory.get_instance_list("pipeline"),
      Err(FactoryError::NotFound { .. })
    ));

    factory.get_template("pipeline").await.unwrap();
    assert!(matches!(
      factory.get_instance("pipeline", 0),
      Err(FactoryError::IndexNotFound { slot: 0, .. })
    ));

    factory.create_instance("pipeline", BASE).await.unwrap();
    assert!(factory.get_instance("pipeline", 0).is_ok());
    assert!(matches!(
      factory.get_instance("pipeline", 1),
      Err(FactoryError::IndexNotFound { slot: 1, .. })
    ));
    assert!(matches!(
      factory.get_instance("pipeline", 7),
      Err(FactoryError::IndexNotFound { slot: 7, .. })
    ));
  }

  #[tokio::test]
  async fn test_fetch_initializes_empty_ledger() {
    let factory = factory(MockSource::with(vec![pipeline()]));
    factory.get_template("pipeline").await.unwrap();

    let snapshot = factory.get_instance_list("pipeline").unwrap();
    assert_eq!(snapshot.capacity, 3);
    assert_eq!(snapshot.created, 0);
    assert!(snapshot.slots.iter().all(Option::is_none));
  }

  #[tokio::test]
  async fn test_wait_times_out_but_load_completes() {
    let source = MockSource::with(vec![pipeline()]).delayed(Duration::from_millis(200));
    let config = FactoryConfig {
      load_timeout_ms: 20,
      ..FactoryConfig::default()
    };
    let factory = WorkflowFactory::new(source.clone(), config).unwrap();

    let err = factory.get_template("pipeline").await.unwrap_err();
    assert!(matches!(err, FactoryError::LoadTimeout { timeout_ms: 20, .. }));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(factory.cached_templates(), vec!["pipeline"]);
    factory.get_template("pipeline").await.unwrap();
    assert_eq!(source.loads(), 1);
  }

  #[tokio::test]
  async fn test_cancelled_fetch() {
    let source = MockSource::with(vec![pipeline()]).delayed(Duration::from_millis(100));
    let factory = factory(source);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = factory
      .get_template_with_cancel("pipeline", cancel)
      .await
      .unwrap_err();
    assert!(matches!(err, FactoryError::Cancelled));
  }

  #[tokio::test]
  async fn test_custom_notifier_receives_events() {
    let mut template = pipeline();
    template.jobs[1].uses[0].size = Some(999);
    template
      .jobs
      .push(JobDescriptor::new("J3", "lonely").with_usage(UsageDeclaration::input("raw", 1)));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let factory = WorkflowFactory::with_notifier(
      MockSource::with(vec![template]),
      FactoryConfig::default(),
      ChannelNotifier::new(tx),
    )
    .unwrap();

    factory.get_template("pipeline").await.unwrap();
    factory.create_instance("pipeline", BASE).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
      events.push(event);
    }
    assert!(events.iter().any(|e| matches!(
      e,
      MaterializeEvent::SizeMismatch { file, job_id: 2, .. } if file == "f1"
    )));
    assert!(events.iter().any(|e| matches!(
      e,
      MaterializeEvent::OrphanInput { file, job_id: 3 } if file == "raw"
    )));
  }

  #[test]
  fn test_zero_capacity_factory_is_rejected() {
    let config = FactoryConfig {
      ledger_capacity: 0,
      ..FactoryConfig::default()
    };
    assert!(matches!(
      WorkflowFactory::new(MockSource::default(), config),
      Err(FactoryError::InvalidConfig { .. })
    ));
  }
}
