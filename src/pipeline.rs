use crate::*;
use std::time::Instant;

/// One configured run over all six hand-size groups.
///
/// Shared setup (table, hand sizes, no-bet action, cluster counts, backend)
/// happens once and any failure there aborts the run. Groups then run
/// strictly in order; an empty group is skipped, anything else aborts.
pub struct Pipeline<'a> {
    config: &'a Config,
    table: ProbabilityTable,
    sizes: HandSizes,
    binomial: Binomial,
    backend: Box<dyn Backend>,
    detection: Detection,
    clusters: [usize; HAND_MAX],
}

impl<'a> Pipeline<'a> {
    /// Load inputs from disk, cluster every group, and stream the results
    /// into `sink`.
    pub fn run(config: &'a Config, sink: &mut impl Sink) -> Result<Buckets> {
        let table = ProbabilityTable::load(&config.table)?;
        let sizes = HandSizes::load(&config.hands)?;
        Self::new(config, table, sizes, config.device.select())?.execute(sink)
    }

    /// Resolve everything the groups share.
    pub fn new(
        config: &'a Config,
        table: ProbabilityTable,
        sizes: HandSizes,
        backend: Box<dyn Backend>,
    ) -> Result<Self> {
        config.validate()?;
        sizes.check(&table)?;
        let histogram = sizes.histogram();
        for (n, population) in histogram.iter().enumerate() {
            log::info!("{:<32}{:<32}", format!("hands of size {}", n), population);
        }
        let detection = Self::no_bet(config.no_bet, &table)?;
        let clusters = config.clusters.resolve(&histogram);
        log::info!("{:<32}{:<32}", "clusters", format!("{:?}", clusters));
        log::info!("{:<32}{:<32}", "backend", backend.name());
        Ok(Self {
            config,
            table,
            sizes,
            binomial: Binomial::default(),
            backend,
            detection,
            clusters,
        })
    }

    fn no_bet(policy: NoBet, table: &ProbabilityTable) -> Result<Detection> {
        let detection = match policy {
            NoBet::Index(action) if action < table.actions() => Detection::Unique(action),
            NoBet::Index(action) => {
                return Err(Error::Range {
                    what: "no-bet action",
                    index: action,
                    limit: table.actions(),
                });
            }
            NoBet::Detect => table.detect(),
        };
        match detection.diagnostic() {
            Some(e) => log::warn!("{:<32}{:<32}", "no-bet action", e),
            None => log::info!("{:<32}{:<32}", "no-bet action", detection.action()),
        }
        Ok(detection)
    }

    pub fn detection(&self) -> Detection {
        self.detection
    }

    pub fn clusters(&self) -> [usize; HAND_MAX] {
        self.clusters
    }

    /// Cluster every group in ascending size, then write the global
    /// mapping and the manifest.
    pub fn execute(self, sink: &mut impl Sink) -> Result<Buckets> {
        let mut buckets = Buckets::new(self.sizes.len());
        let mut records = Vec::with_capacity(HAND_MAX);
        for group in GROUPS {
            let start = Instant::now();
            let k = self.clusters[group - 1];
            let record = match self.group(group, k) {
                Ok(output) => {
                    buckets.absorb(&output.hands, &output.clustering.labels)?;
                    let record = GroupRecord {
                        group,
                        population: output.hands.len(),
                        k,
                        identity: output.clustering.is_identity(),
                        skipped: false,
                        inertia: output.clustering.inertia,
                        seconds: start.elapsed().as_secs_f64(),
                    };
                    sink.group(output)?;
                    record
                }
                Err(e) if e.is_group_local() => {
                    log::warn!("{:<32}{:<32}", format!("skipping group {}", group), e);
                    GroupRecord {
                        group,
                        population: 0,
                        k,
                        identity: false,
                        skipped: true,
                        inertia: 0.,
                        seconds: start.elapsed().as_secs_f64(),
                    }
                }
                Err(e) => {
                    log::error!("{:<32}{:<32}", format!("group {} failed", group), e);
                    return Err(e);
                }
            };
            log::info!(
                "{:<32}{:<32}",
                format!("group {} done", group),
                format!("{:.3}s", record.seconds)
            );
            records.push(record);
        }
        let uncovered = buckets.uncovered();
        if uncovered > 0 {
            log::info!("{:<32}{:<32}", "uncovered hands", uncovered);
        }
        sink.buckets(&buckets)?;
        sink.manifest(&self.manifest(records))?;
        Ok(buckets)
    }

    /// Labels, centers, and statistics for hands of size `group`.
    ///
    /// Features are built even when every hand gets its own bucket, so a
    /// table too small or malformed for the group is rejected either way.
    pub fn group(&self, group: usize, k: usize) -> Result<GroupOutput> {
        let population = self.sizes.population(group);
        if population == 0 {
            return Err(Error::EmptyGroup { group });
        }
        log::info!(
            "{:<32}{:<32}",
            format!("group {}", group),
            format!("{} hands into {} buckets", population, k)
        );
        log::info!("{:<32}{:<32}", "featurizing", group);
        let mut features = Features::build(
            &self.table,
            &self.sizes,
            group,
            self.detection.action(),
            &self.binomial,
        )?;
        if k >= population {
            log::info!("{:<32}{:<32}", "identity buckets", population);
            let (_, hands) = features.into_parts();
            return Ok(GroupOutput {
                group,
                hands,
                clustering: Clustering::identity(population),
                normalization: Normalization::default(),
            });
        }
        log::info!("{:<32}{:<32}", "normalizing", group);
        let normalization = Normalization::transform(features.matrix_mut());
        let (ref matrix, hands) = features.into_parts();
        log::info!("{:<32}{:<32}", "clustering", group);
        let clustering = MiniBatch::fit(matrix, k, &self.config.schedule, self.backend.as_ref())?;
        log::info!(
            "{:<32}{:<32}",
            "finalized",
            format!("inertia {:.6}", clustering.inertia)
        );
        Ok(GroupOutput {
            group,
            hands,
            clustering,
            normalization,
        })
    }

    fn manifest(&self, groups: Vec<GroupRecord>) -> Manifest {
        Manifest {
            table: self.config.table.clone(),
            hands: self.config.hands.clone(),
            device: self.config.device,
            backend: self.backend.name().to_string(),
            schedule: self.config.schedule,
            clusters: self.clusters,
            no_bet: self.detection.action(),
            ambiguous: self.detection.diagnostic().is_some(),
            groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;
    use std::path::PathBuf;

    fn config() -> Config {
        let mut config = Config::new(
            PathBuf::from("p.ttp0"),
            HandSource::Sizes(PathBuf::from("sizes.bin")),
            PathBuf::from("out"),
        );
        config.schedule.iterations = 20;
        config.clusters = Clusters::Explicit([3, 2, 1, 1, 1, 1]);
        config
    }

    fn run(config: &Config, sizes: HandSizes, backend: Box<dyn Backend>) -> (Buckets, Memory) {
        let mut sink = Memory::default();
        let buckets = Pipeline::new(config, fixture_table(), sizes, backend)
            .unwrap()
            .execute(&mut sink)
            .unwrap();
        (buckets, sink)
    }

    #[test]
    fn end_to_end() {
        let (buckets, sink) = run(&config(), fixture_sizes(), Box::new(Vectorized));

        let singles = &sink.groups[&1];
        assert!(singles.clustering.is_identity());
        assert_eq!(singles.hands, vec![0, 1, 2]);
        assert_eq!(singles.clustering.labels, vec![0, 1, 2]);
        assert!(singles.normalization.is_empty());

        let pairs = &sink.groups[&2];
        assert_eq!(pairs.hands, vec![3, 4, 5, 6, 7]);
        assert_eq!(pairs.clustering.centers.rows(), 2);
        assert_eq!(pairs.clustering.centers.cols(), Features::width(FIXTURE_ACTIONS));
        assert!(pairs.clustering.labels.iter().all(|l| *l < 2));
        assert!(pairs.clustering.populations().iter().all(|p| *p > 0));
        let ref labels = pairs.clustering.labels;
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_eq!(labels[3], labels[4]);

        assert_eq!(buckets.len(), 8);
        assert_eq!(buckets.uncovered(), 0);
        assert_eq!(sink.buckets.as_ref(), Some(&buckets));
    }

    #[test]
    fn empty_groups_are_skipped() {
        let (_, sink) = run(&config(), fixture_sizes(), Box::new(Vectorized));
        assert_eq!(sink.groups.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        let manifest = sink.manifest.unwrap();
        assert_eq!(manifest.groups.len(), HAND_MAX);
        assert!(manifest.groups[2..].iter().all(|g| g.skipped));
        assert!(!manifest.groups[1].skipped);
        assert!(manifest.groups[0].identity);
        assert_eq!(manifest.no_bet, FIXTURE_NO_BET);
        assert!(!manifest.ambiguous);
        assert_eq!(manifest.backend, "vectorized");
        assert_eq!(manifest.clusters, [3, 2, 1, 1, 1, 1]);
    }

    #[test]
    fn empty_hands_stay_uncovered() {
        let mut sizes = FIXTURE_SIZES.to_vec();
        sizes[0] = 0;
        let sizes = HandSizes::try_from(sizes).unwrap();
        let (buckets, sink) = run(&config(), sizes, Box::new(Vectorized));
        assert_eq!(buckets.get(0), Some(UNCOVERED));
        assert_eq!(buckets.uncovered(), 1);
        assert_eq!(sink.groups[&1].clustering.labels, vec![0, 1]);
    }

    #[test]
    fn repeated_runs_agree() {
        let (a, _) = run(&config(), fixture_sizes(), Box::new(Vectorized));
        let (b, _) = run(&config(), fixture_sizes(), Box::new(Vectorized));
        assert_eq!(a, b);
    }

    #[test]
    fn backends_agree() {
        let accelerated = Accelerated::with_threads(2).unwrap();
        let (a, _) = run(&config(), fixture_sizes(), Box::new(Vectorized));
        let (b, _) = run(&config(), fixture_sizes(), Box::new(accelerated));
        assert_eq!(a, b);
    }

    #[test]
    fn explicit_no_bet_is_range_checked() {
        let mut config = config();
        config.no_bet = NoBet::Index(FIXTURE_ACTIONS);
        let err = Pipeline::new(&config, fixture_table(), fixture_sizes(), Box::new(Vectorized))
            .err()
            .unwrap();
        assert!(err.is_fatal());
        assert!(matches!(err, Error::Range { what: "no-bet action", .. }));
    }

    #[test]
    fn ambiguous_no_bet_is_recorded() {
        let mut bytes = Vec::new();
        fixture_table().write(&mut bytes).unwrap();
        let block = FIXTURE_CARDS * FIXTURE_SIZES.len() * 4;
        bytes[TABLE_HEADER_BYTES..TABLE_HEADER_BYTES + block].fill(0);
        let table = ProbabilityTable::parse(&bytes).unwrap();
        let mut sink = Memory::default();
        let buckets = Pipeline::new(&config(), table, fixture_sizes(), Box::new(Vectorized))
            .unwrap()
            .execute(&mut sink)
            .unwrap();
        assert_eq!(buckets.uncovered(), 0);
        let manifest = sink.manifest.unwrap();
        assert!(manifest.ambiguous);
        assert_eq!(manifest.no_bet, 0);
    }

    #[test]
    fn identity_groups_still_check_the_table() {
        let mut sizes = FIXTURE_SIZES.to_vec();
        sizes[7] = 3;
        let sizes = HandSizes::try_from(sizes).unwrap();
        let mut config = config();
        config.clusters = Clusters::Explicit([3, 2, 5, 1, 1, 1]);
        let err = Pipeline::new(&config, fixture_table(), sizes, Box::new(Vectorized))
            .unwrap()
            .execute(&mut Memory::default())
            .unwrap_err();
        assert!(matches!(err, Error::Range { what: "card total", index: 9, .. }));
    }

    #[test]
    fn hand_count_must_match_table() {
        let sizes = HandSizes::try_from(vec![1, 1, 2]).unwrap();
        let err = Pipeline::new(&config(), fixture_table(), sizes, Box::new(Vectorized))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Size { .. }));
    }

    #[test]
    fn runs_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("p.ttp0");
        let sizes = dir.path().join("sizes.bin");
        fixture_table().save(&table).unwrap();
        std::fs::write(&sizes, FIXTURE_SIZES).unwrap();
        let mut config = config();
        config.table = table;
        config.hands = HandSource::Sizes(sizes);
        config.out = dir.path().join("out");
        config.device = Device::Vectorized;
        let mut sink = Artifacts::create(&config.out).unwrap();
        let buckets = Pipeline::run(&config, &mut sink).unwrap();
        assert_eq!(buckets.uncovered(), 0);
        assert_eq!(std::fs::read(sink.mapping()).unwrap().len(), 8 * 4);
        assert_eq!(std::fs::read(sink.labels(2)).unwrap().len(), 5 * 4);
        assert!(!sink.labels(3).exists());
        let manifest = serde_json::from_str::<Manifest>(
            &std::fs::read_to_string(sink.config()).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest.schedule.iterations, 20);
    }
}
