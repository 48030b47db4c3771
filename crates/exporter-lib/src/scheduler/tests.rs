//! Scheduler behaviour with controllable mock sources

#[cfg(test)]
mod mock_source_tests {
    use crate::collector::{async_trait, CollectionContext, MetricSource};
    use crate::config::CollectMode;
    use crate::error::CollectError;
    use crate::health::{ComponentStatus, HealthRegistry};
    use crate::models::{Label, MetricKind, MetricSample, SourceResult};
    use crate::observability::SCRAPE_DURATION_NAME;
    use crate::scheduler::{Scheduler, SchedulerBuilder};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Mock source whose passes block until the gate opens
    struct MockSource {
        name: String,
        fail: bool,
        gate: Option<Arc<Semaphore>>,
        contexts: AtomicUsize,
        collects: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
    }

    impl MockSource {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                fail: false,
                gate: None,
                contexts: AtomicUsize::new(0),
                collects: Arc::new(AtomicUsize::new(0)),
                releases: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn gated(mut self, gate: Arc<Semaphore>) -> Self {
            self.gate = Some(gate);
            self
        }
    }

    struct MockContext {
        source: String,
        sequence: usize,
        fail: bool,
        gate: Option<Arc<Semaphore>>,
        collects: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
        collected: bool,
        samples: Vec<MetricSample>,
    }

    impl MetricSource for MockSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn new_ctx(&self) -> Box<dyn CollectionContext> {
            Box::new(MockContext {
                source: self.name.clone(),
                sequence: self.contexts.fetch_add(1, Ordering::SeqCst) + 1,
                fail: self.fail,
                gate: self.gate.clone(),
                collects: Arc::clone(&self.collects),
                releases: Arc::clone(&self.releases),
                collected: false,
                samples: Vec::new(),
            })
        }
    }

    #[async_trait]
    impl CollectionContext for MockContext {
        async fn collect(&mut self) -> Result<(), CollectError> {
            if self.collected {
                return Ok(());
            }
            self.collected = true;
            self.collects.fetch_add(1, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await.unwrap();
            }
            if self.fail {
                return Err(CollectError::Task("mock failure".to_string()));
            }

            self.samples.push(MetricSample::new(
                MetricKind::Gauge,
                "lustre_mock_pass",
                "Sequence number of the pass",
                vec![Label::new("source", self.source.clone())],
                self.sequence as f64,
            ));
            Ok(())
        }

        fn update(&self, out: &mut Vec<MetricSample>) {
            out.extend_from_slice(&self.samples);
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn scheduler(sources: Vec<Arc<dyn MetricSource>>) -> SchedulerBuilder {
        SchedulerBuilder::new()
            .sources(sources)
            .shelf_life(Duration::from_secs(3600))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn spawn_scrapes(
        scheduler: &Arc<Scheduler>,
        count: usize,
    ) -> Vec<tokio::task::JoinHandle<Vec<MetricSample>>> {
        (0..count)
            .map(|_| {
                let scheduler = Arc::clone(scheduler);
                tokio::spawn(async move { scheduler.collect().await })
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fresh_pass_is_replayed() {
        let source = Arc::new(MockSource::new("mock"));
        let collects = Arc::clone(&source.collects);
        let scheduler = scheduler(vec![source]).build().unwrap();

        let first = scheduler.collect().await;
        let second = scheduler.collect().await;

        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
        assert_eq!(scheduler.passes_started(), 1);
        assert_eq!(collects.load(Ordering::SeqCst), 1);
        // every publish is timed, replays included
        assert_eq!(
            scheduler.durations().count("mock", SourceResult::Success),
            2
        );
    }

    #[tokio::test]
    async fn test_scrapes_within_shelf_life_share_one_pass() {
        let source = Arc::new(MockSource::new("mock"));
        let scheduler = scheduler(vec![source]).build().unwrap();
        scheduler.collect().await;

        let results = futures_join(spawn_scrapes(&scheduler, 10)).await;
        assert_eq!(scheduler.passes_started(), 1);
        assert!(results.iter().all(|r| r == &results[0]));
    }

    #[tokio::test]
    async fn test_concurrency_bound_attaches_to_oldest() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(MockSource::new("mock").gated(Arc::clone(&gate)));
        let collects = Arc::clone(&source.collects);
        let scheduler = scheduler(vec![source]).max_workers(2).build().unwrap();

        let handles = spawn_scrapes(&scheduler, 6);
        settle().await;

        assert_eq!(scheduler.passes_started(), 2);
        assert_eq!(scheduler.in_flight(), 2);
        assert_eq!(collects.load(Ordering::SeqCst), 2);

        gate.add_permits(1);
        let results = futures_join(handles).await;

        assert_eq!(scheduler.passes_started(), 2);
        let values: Vec<f64> = results.iter().map(|r| r[0].value).collect();
        assert_eq!(values.iter().filter(|v| **v == 1.0).count(), 5);
        assert_eq!(values.iter().filter(|v| **v == 2.0).count(), 1);

        settle().await;
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_expired_pass_is_not_reused() {
        let source = Arc::new(MockSource::new("mock"));
        let scheduler = SchedulerBuilder::new()
            .sources(vec![source])
            .shelf_life(Duration::from_millis(10))
            .build()
            .unwrap();

        let first = scheduler.collect().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = scheduler.collect().await;

        assert_eq!(scheduler.passes_started(), 2);
        assert_eq!(first[0].value, 1.0);
        assert_eq!(second[0].value, 2.0);
    }

    #[tokio::test]
    async fn test_legacy_mode_runs_a_pass_per_scrape() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(MockSource::new("mock").gated(Arc::clone(&gate)));
        let releases = Arc::clone(&source.releases);
        let scheduler = scheduler(vec![source])
            .mode(CollectMode::V1)
            .max_workers(1)
            .build()
            .unwrap();

        let handles = spawn_scrapes(&scheduler, 3);
        settle().await;
        // no cap in legacy mode
        assert_eq!(scheduler.passes_started(), 3);
        assert_eq!(scheduler.in_flight(), 0);

        gate.add_permits(1);
        let results = futures_join(handles).await;
        let mut values: Vec<f64> = results.iter().map(|r| r[0].value).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(releases.load(Ordering::SeqCst), 3);

        scheduler.collect().await;
        assert_eq!(scheduler.passes_started(), 4);
    }

    #[tokio::test]
    async fn test_source_failure_is_isolated() {
        let good = Arc::new(MockSource::new("good"));
        let bad = Arc::new(MockSource::new("bad").failing());
        let health = HealthRegistry::new();
        let scheduler = scheduler(vec![good, bad])
            .mode(CollectMode::V1)
            .health(health.clone())
            .build()
            .unwrap();
        scheduler.register_health().await;

        let samples = scheduler.collect().await;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label("source"), Some("good"));

        assert_eq!(scheduler.durations().count("good", SourceResult::Success), 1);
        assert_eq!(scheduler.durations().count("bad", SourceResult::Error), 1);

        let report = health.health().await;
        assert_eq!(report.components["good"].status, ComponentStatus::Healthy);
        assert_eq!(report.components["bad"].status, ComponentStatus::Degraded);
        assert!(report.components["bad"]
            .message
            .as_deref()
            .unwrap()
            .contains("mock failure"));
    }

    #[tokio::test]
    async fn test_update_appends_duration_summary() {
        let scheduler = scheduler(vec![
            Arc::new(MockSource::new("good")),
            Arc::new(MockSource::new("bad").failing()),
        ])
        .build()
        .unwrap();

        let families = scheduler.update().await;
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert_eq!(names, vec!["lustre_mock_pass", SCRAPE_DURATION_NAME]);

        let summary = &families[1];
        assert_eq!(summary.get_metric().len(), 2);
        for metric in summary.get_metric() {
            assert_eq!(metric.get_summary().get_sample_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_contexts_released_after_completion() {
        let source = Arc::new(MockSource::new("mock"));
        let releases = Arc::clone(&source.releases);
        let scheduler = scheduler(vec![source]).build().unwrap();

        scheduler.collect().await;
        for _ in 0..100 {
            if releases.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        // replay after release still serves the samples
        assert_eq!(scheduler.collect().await.len(), 1);
    }

    #[test]
    fn test_builder_requires_sources() {
        assert!(SchedulerBuilder::new().build().is_err());
        assert!(SchedulerBuilder::new().sources(Vec::new()).build().is_err());
    }

    #[test]
    fn test_zero_workers_normalised() {
        let scheduler = scheduler(vec![Arc::new(MockSource::new("mock"))])
            .max_workers(0)
            .build()
            .unwrap();
        assert_eq!(scheduler.config().max_workers, 4);
    }

    async fn futures_join(
        handles: Vec<tokio::task::JoinHandle<Vec<MetricSample>>>,
    ) -> Vec<Vec<MetricSample>> {
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results
    }
}
