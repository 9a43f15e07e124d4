//! Per-step orchestration of generation across all ranks.

use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::GrpoConfig;
use crate::distribute::DistributionPlan;
use crate::distributed::{gather_object, Collective};
use crate::infer::{InferOutput, InferRequest, InferenceEngine};
use crate::model::{OptimizerHandle, TrainableModel};
use crate::rollout::queue::{AsyncRolloutQueue, DataCache};
use crate::session::Example;
use crate::sync::{WeightShard, WeightSyncEngine};
use crate::{GrpoError, Result};

/// Drives one rollout round per training step: weight sync, request
/// distribution, generation, gather and reorder.
///
/// Ranks with `local_rank < num_infer_workers` own an inference engine and
/// serve requests; the remaining ranks only contribute prompts and receive
/// completions through the collective. Every rank must call [`generate`] the
/// same number of times with the same step sequence.
///
/// [`generate`]: RolloutCoordinator::generate
pub struct RolloutCoordinator {
    config: GrpoConfig,
    collective: Arc<dyn Collective>,
    engine: Option<Arc<Mutex<dyn InferenceEngine>>>,
    sync: WeightSyncEngine,
    shards: Vec<WeightShard>,
    queue: Option<AsyncRolloutQueue>,
}

impl RolloutCoordinator {
    pub fn new(
        config: GrpoConfig,
        collective: Arc<dyn Collective>,
        engine: Option<Arc<Mutex<dyn InferenceEngine>>>,
        shards: Vec<WeightShard>,
    ) -> Result<Self> {
        let topology = collective.topology();
        config.validate(&topology)?;

        let is_worker = topology.local_rank < config.num_infer_workers;
        if is_worker && engine.is_none() {
            return Err(GrpoError::Config(format!(
                "local rank {} serves inference but was given no engine",
                topology.local_rank
            )));
        }
        if !is_worker && engine.is_some() {
            return Err(GrpoError::Config(format!(
                "local rank {} is training-only but was given an engine",
                topology.local_rank
            )));
        }

        let queue = config.async_generate.then(AsyncRolloutQueue::new);
        Ok(Self {
            config,
            collective,
            engine,
            sync: WeightSyncEngine::new(),
            shards,
            queue,
        })
    }

    /// Global inference worker index of this rank, if it serves requests.
    pub fn infer_rank(&self) -> Option<usize> {
        let topology = self.collective.topology();
        (topology.local_rank < self.config.num_infer_workers)
            .then(|| topology.node * self.config.num_infer_workers + topology.local_rank)
    }

    /// Index among tensor-parallel group leaders, if this rank is one.
    pub fn infer_rank_tp0(&self) -> Option<usize> {
        let topology = self.collective.topology();
        let tp = self.config.tensor_parallel_size;
        let groups_per_node = self.config.num_infer_workers / tp;
        (topology.local_rank < self.config.num_infer_workers && topology.local_rank % tp == 0)
            .then(|| topology.node * groups_per_node + topology.local_rank / tp)
    }

    fn lock_engine(&self) -> Result<MutexGuard<'_, dyn InferenceEngine + 'static>> {
        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| GrpoError::Config("this rank holds no inference engine".to_string()))?;
        engine
            .lock()
            .map_err(|_| GrpoError::Protocol("inference engine lock poisoned".to_string()))
    }

    /// The tensor-parallel group's combined request batch and the sub-range of
    /// its outputs that belong to this rank.
    ///
    /// Every replica in a group runs the identical combined batch with a
    /// shared seed, then keeps only its own slice. With `tp == 1` the group is
    /// just this rank.
    fn worker_requests(
        &self,
        all_inputs: &[Example],
        plan: &DistributionPlan,
    ) -> Result<(Vec<InferRequest>, Range<usize>)> {
        let topology = self.collective.topology();
        let tp = self.config.tensor_parallel_size;
        let group_base = (topology.local_rank / tp) * tp;

        let mut requests = Vec::new();
        let mut own_range = 0..0;
        for member in 0..tp {
            let worker = topology.node * self.config.num_infer_workers + group_base + member;
            let start = requests.len();
            for idx in plan.worker_indices(worker) {
                let input = all_inputs.get(*idx).ok_or_else(|| {
                    GrpoError::Protocol(format!("distribution plan references input {}", idx))
                })?;
                requests.push(InferRequest {
                    messages: input.messages.clone(),
                });
            }
            if group_base + member == topology.local_rank {
                own_range = start..requests.len();
            }
        }
        Ok((requests, own_range))
    }

    fn sync_weights(&mut self, model: &dyn TrainableModel, step: u64) -> Result<()> {
        if !self.sync.needs_sync(step) {
            return Ok(());
        }
        // A push must not race an in-flight generation against stale weights.
        if let Some(queue) = &self.queue {
            queue.wait_ready();
        }
        if let Some(engine) = &self.engine {
            let engine = Arc::clone(engine);
            let mut guard = engine
                .lock()
                .map_err(|_| GrpoError::Protocol("inference engine lock poisoned".to_string()))?;
            if self.config.sleep_level > 0 && guard.is_sleeping() {
                guard.wake_up();
            }
            self.sync.sync(model, &mut *guard, &self.shards, step)?;
        } else {
            self.sync.mark_synced(step);
        }
        self.collective.barrier();
        Ok(())
    }

    /// Generate completions for this rank's `inputs` at `step`.
    ///
    /// Returns the inputs actually answered alongside one output per input, in
    /// input order. On the asynchronous path these are the inputs submitted on
    /// the previous call, one step stale by construction.
    pub fn generate(
        &mut self,
        step: u64,
        model: &mut dyn TrainableModel,
        optimizer: &mut dyn OptimizerHandle,
        inputs: Vec<Example>,
    ) -> Result<(Vec<Example>, Vec<InferOutput>)> {
        let topology = self.collective.topology();

        // Free accelerator memory before the engine wakes: the woken engine
        // and the training modules must not be resident at the same time.
        // The merged weight push reads the offloaded copies.
        if self.config.offload_model {
            self.sync.offload_model(model)?;
        }
        if self.config.offload_optimizer {
            self.sync.offload_optimizer(optimizer)?;
        }
        self.sync_weights(model, step)?;

        let all_inputs = gather_object(self.collective.as_ref(), &inputs)?;
        let total_workers = self.config.total_infer_workers(&topology);
        let plan = DistributionPlan::round_robin(all_inputs.len(), total_workers);

        let (inputs_used, plan_used, local_outputs) = if self.config.async_generate {
            self.exchange_async(step, inputs, &all_inputs, plan)?
        } else {
            let outputs = self.run_local_inference(step, &all_inputs, &plan)?;
            (inputs, plan, outputs)
        };

        let gathered = gather_object(self.collective.as_ref(), &local_outputs)?;
        let ordered = plan_used.reorder(gathered)?;

        if self.engine.is_some() && self.config.sleep_level > 0 {
            self.lock_engine()?.sleep(self.config.sleep_level);
        }
        if self.config.offload_model {
            self.sync.load_model(model)?;
        }
        if self.config.offload_optimizer {
            self.sync.load_optimizer(optimizer)?;
        }

        let count = inputs_used.len();
        let start = topology.rank * count;
        if start + count > ordered.len() {
            return Err(GrpoError::Protocol(format!(
                "rank {} expected outputs [{}, {}) but only {} were gathered",
                topology.rank,
                start,
                start + count,
                ordered.len()
            )));
        }
        let local = ordered
            .into_iter()
            .skip(start)
            .take(count)
            .collect::<Vec<_>>();
        Ok((inputs_used, local))
    }

    /// Seed the asynchronous pipeline with a blocking generation so the first
    /// training step has a buffered result to consume.
    pub fn prefetch(
        &mut self,
        step: u64,
        model: &mut dyn TrainableModel,
        inputs: Vec<Example>,
    ) -> Result<()> {
        if self.queue.is_none() {
            return Err(GrpoError::Config(
                "prefetch requires async_generate".to_string(),
            ));
        }

        self.sync_weights(model, step)?;
        let topology = self.collective.topology();
        let all_inputs = gather_object(self.collective.as_ref(), &inputs)?;
        let plan = DistributionPlan::round_robin(
            all_inputs.len(),
            self.config.total_infer_workers(&topology),
        );
        let outputs = self.run_local_inference(step, &all_inputs, &plan)?;

        let queue = self.queue.as_ref().ok_or_else(|| {
            GrpoError::Config("prefetch requires async_generate".to_string())
        })?;
        queue.put(DataCache {
            inputs,
            outputs,
            plan,
        })?;
        self.collective.barrier();
        Ok(())
    }

    /// Blocking generation of this rank's share of `all_inputs`.
    fn run_local_inference(
        &self,
        step: u64,
        all_inputs: &[Example],
        plan: &DistributionPlan,
    ) -> Result<Vec<InferOutput>> {
        if self.engine.is_none() {
            return Ok(Vec::new());
        }
        let (requests, own_range) = self.worker_requests(all_inputs, plan)?;
        let request_config = self.config.request_config(step);
        let outputs = self.lock_engine()?.infer(&requests, &request_config)?;
        if outputs.len() != requests.len() {
            return Err(GrpoError::Protocol(format!(
                "engine returned {} outputs for {} requests",
                outputs.len(),
                requests.len()
            )));
        }
        Ok(outputs
            .into_iter()
            .skip(own_range.start)
            .take(own_range.len())
            .collect())
    }

    /// Submit this step's job to the background worker and consume the cache
    /// buffered by the previous submission.
    fn exchange_async(
        &mut self,
        step: u64,
        inputs: Vec<Example>,
        all_inputs: &[Example],
        plan: DistributionPlan,
    ) -> Result<(Vec<Example>, DistributionPlan, Vec<InferOutput>)> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| GrpoError::Protocol("async exchange without a queue".to_string()))?;

        if let Some(engine) = &self.engine {
            let (requests, own_range) = self.worker_requests(all_inputs, &plan)?;
            let request_config = self.config.request_config(step);
            let engine = Arc::clone(engine);
            queue.submit(Box::new(move || {
                let outputs = match engine.lock() {
                    Ok(mut guard) => match guard.infer(&requests, &request_config) {
                        Ok(outputs) => outputs
                            .into_iter()
                            .skip(own_range.start)
                            .take(own_range.len())
                            .collect(),
                        Err(err) => {
                            tracing::error!(%err, "background generation failed");
                            Vec::new()
                        }
                    },
                    Err(_) => {
                        tracing::error!("inference engine lock poisoned");
                        Vec::new()
                    }
                };
                DataCache {
                    inputs,
                    outputs,
                    plan,
                }
            }))?;
            let cache = queue.get()?;
            return Ok((cache.inputs, cache.plan, cache.outputs));
        }

        // No engine on this rank. The single-slot cache still holds the
        // previous step's entry, so it must be consumed before the empty
        // placeholder for this step goes in.
        let cache = queue.get()?;
        queue.put(DataCache::empty(inputs, plan))?;
        Ok((cache.inputs, cache.plan, cache.outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::ThreadCollective;
    use crate::infer::{ChatChoice, ChatMessage, RequestConfig, StopReason};
    use std::thread;
    use tch::{Device, Kind, Tensor};

    /// Echoes every prompt back, tagged with an engine id.
    struct EchoEngine {
        id: usize,
        sleeping: bool,
    }

    impl InferenceEngine for EchoEngine {
        fn infer(
            &mut self,
            requests: &[InferRequest],
            _config: &RequestConfig,
        ) -> crate::Result<Vec<InferOutput>> {
            Ok(requests
                .iter()
                .map(|request| InferOutput {
                    choices: vec![ChatChoice {
                        message: ChatMessage::assistant(format!(
                            "engine{}:{}",
                            self.id, request.messages[0].content
                        )),
                        token_ids: Vec::new(),
                        stop_reason: StopReason::Stop,
                    }],
                })
                .collect())
        }

        fn load_weights(&mut self, _weights: Vec<(String, Tensor)>) -> crate::Result<()> {
            Ok(())
        }

        fn sleep(&mut self, _level: u8) {
            self.sleeping = true;
        }

        fn wake_up(&mut self) {
            self.sleeping = false;
        }

        fn is_sleeping(&self) -> bool {
            self.sleeping
        }
    }

    fn prompt(rank: usize, i: usize) -> Example {
        Example::from_prompt(vec![ChatMessage::user(format!("r{}p{}", rank, i))])
    }

    fn run_two_ranks(config: GrpoConfig) -> Vec<(Vec<Example>, Vec<InferOutput>)> {
        let ranks = ThreadCollective::local_group(2, 8);
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|collective| {
                let config = config.clone();
                thread::spawn(move || {
                    let rank = collective.rank();
                    let engine: Option<Arc<Mutex<dyn InferenceEngine>>> =
                        (rank < config.num_infer_workers).then(|| {
                            Arc::new(Mutex::new(EchoEngine {
                                id: rank,
                                sleeping: false,
                            })) as Arc<Mutex<dyn InferenceEngine>>
                        });
                    let mut coordinator = RolloutCoordinator::new(
                        config,
                        Arc::new(collective),
                        engine,
                        Vec::new(),
                    )
                    .unwrap();
                    // Empty shard list: skip the weight push but keep the gate.
                    coordinator.sync.mark_synced(0);

                    let mut model = crate::model::TensorMapModel::new();
                    let mut optimizer = crate::model::TensorMapOptimizer::default();
                    let inputs = vec![prompt(rank, 0), prompt(rank, 1)];
                    coordinator
                        .generate(0, &mut model, &mut optimizer, inputs)
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn each_rank_receives_outputs_for_its_own_prompts() {
        let config = GrpoConfig::default()
            .with_num_generations(2)
            .with_per_device_batch(2)
            .with_infer_workers(1);
        let results = run_two_ranks(config);

        for (rank, (inputs, outputs)) in results.iter().enumerate() {
            assert_eq!(outputs.len(), inputs.len());
            for (input, output) in inputs.iter().zip(outputs) {
                let reply = &output.choices[0].message.content;
                assert!(reply.ends_with(&input.messages[0].content));
                assert!(reply.starts_with("engine0:"));
            }
            assert_eq!(inputs[0].messages[0].content, format!("r{}p0", rank));
        }
    }

    #[test]
    fn work_is_split_across_two_engines() {
        let config = GrpoConfig::default()
            .with_num_generations(2)
            .with_per_device_batch(2)
            .with_infer_workers(2);
        let results = run_two_ranks(config);

        // Round-robin over 4 prompts and 2 workers interleaves the engines,
        // and reordering restores prompt order on every rank.
        let mut engines_seen = std::collections::BTreeSet::new();
        for (inputs, outputs) in &results {
            for (input, output) in inputs.iter().zip(outputs) {
                let reply = &output.choices[0].message.content;
                assert!(reply.ends_with(&input.messages[0].content));
                let engine = reply.split(':').next().unwrap().to_string();
                engines_seen.insert(engine);
            }
        }
        assert_eq!(engines_seen.len(), 2);
    }

    #[test]
    fn async_results_are_one_step_stale() {
        let collective = ThreadCollective::local_group(1, 8).remove(0);
        let config = GrpoConfig::default()
            .with_num_generations(2)
            .with_per_device_batch(2)
            .with_async_generate(true);
        let engine: Arc<Mutex<dyn InferenceEngine>> = Arc::new(Mutex::new(EchoEngine {
            id: 0,
            sleeping: false,
        }));
        let mut coordinator =
            RolloutCoordinator::new(config, Arc::new(collective), Some(engine), Vec::new())
                .unwrap();
        let mut model = crate::model::TensorMapModel::new();
        let mut optimizer = crate::model::TensorMapOptimizer::default();
        coordinator.sync.mark_synced(0);

        coordinator
            .prefetch(0, &mut model, vec![prompt(0, 0), prompt(0, 1)])
            .unwrap();

        for step in 1..4u64 {
            coordinator.sync.mark_synced(step);
            let submitted = vec![prompt(step as usize, 0), prompt(step as usize, 1)];
            let (used, outputs) = coordinator
                .generate(step, &mut model, &mut optimizer, submitted)
                .unwrap();
            // The consumed batch is the one submitted one step earlier.
            assert_eq!(
                used[0].messages[0].content,
                format!("r{}p0", step - 1)
            );
            assert!(outputs[0].choices[0]
                .message
                .content
                .ends_with(&used[0].messages[0].content));
        }
    }

    #[test]
    fn async_pipeline_advances_on_a_rank_without_an_engine() {
        let ranks = ThreadCollective::local_group(2, 8);
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|collective| {
                thread::spawn(move || {
                    let rank = collective.rank();
                    let config = GrpoConfig::default()
                        .with_num_generations(2)
                        .with_per_device_batch(2)
                        .with_infer_workers(1)
                        .with_async_generate(true);
                    let engine: Option<Arc<Mutex<dyn InferenceEngine>>> = (rank == 0).then(|| {
                        Arc::new(Mutex::new(EchoEngine {
                            id: 0,
                            sleeping: false,
                        })) as Arc<Mutex<dyn InferenceEngine>>
                    });
                    let mut coordinator =
                        RolloutCoordinator::new(config, Arc::new(collective), engine, Vec::new())
                            .unwrap();
                    coordinator.sync.mark_synced(0);
                    let mut model = crate::model::TensorMapModel::new();
                    let mut optimizer = crate::model::TensorMapOptimizer::default();

                    coordinator
                        .prefetch(0, &mut model, vec![prompt(rank, 0), prompt(rank, 100)])
                        .unwrap();

                    // Rank 1 holds no engine; each step it must still drain the
                    // single-slot cache before buffering its own prompts, or
                    // every rank wedges at the next gather.
                    for step in 1..4u64 {
                        coordinator.sync.mark_synced(step);
                        let submitted = vec![
                            prompt(rank, step as usize),
                            prompt(rank, 100 + step as usize),
                        ];
                        let (used, outputs) = coordinator
                            .generate(step, &mut model, &mut optimizer, submitted)
                            .unwrap();
                        assert_eq!(
                            used[0].messages[0].content,
                            format!("r{}p{}", rank, step - 1)
                        );
                        assert_eq!(outputs.len(), used.len());
                        for (input, output) in used.iter().zip(&outputs) {
                            assert!(output.choices[0]
                                .message
                                .content
                                .ends_with(&input.messages[0].content));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    struct EventModel {
        events: Arc<Mutex<Vec<String>>>,
        device: Device,
    }

    impl TrainableModel for EventModel {
        fn parameter_names(&self) -> Vec<String> {
            vec!["model.layers.0.weight".to_string()]
        }

        fn merge_subset(&self, names: &[String]) -> crate::Result<Vec<(String, Tensor)>> {
            Ok(names
                .iter()
                .map(|name| (name.clone(), Tensor::ones([2, 2], (Kind::Float, Device::Cpu))))
                .collect())
        }

        fn submodule_devices(&self) -> Vec<(String, Device)> {
            vec![("model.layers.0.weight".to_string(), self.device)]
        }

        fn move_submodule(&mut self, _name: &str, device: Device) -> crate::Result<()> {
            let event = if device == Device::Cpu {
                "model_offloaded"
            } else {
                "model_restored"
            };
            self.events.lock().unwrap().push(event.to_string());
            self.device = device;
            Ok(())
        }
    }

    struct EventOptimizer {
        events: Arc<Mutex<Vec<String>>>,
        device: Device,
    }

    impl OptimizerHandle for EventOptimizer {
        fn state_devices(&self) -> Vec<(String, Device)> {
            vec![("exp_avg".to_string(), self.device)]
        }

        fn move_state(&mut self, _name: &str, device: Device) -> crate::Result<()> {
            let event = if device == Device::Cpu {
                "optimizer_offloaded"
            } else {
                "optimizer_restored"
            };
            self.events.lock().unwrap().push(event.to_string());
            self.device = device;
            Ok(())
        }
    }

    struct EventEngine {
        events: Arc<Mutex<Vec<String>>>,
        sleeping: bool,
    }

    impl InferenceEngine for EventEngine {
        fn infer(
            &mut self,
            requests: &[InferRequest],
            _config: &RequestConfig,
        ) -> crate::Result<Vec<InferOutput>> {
            self.events.lock().unwrap().push("infer".to_string());
            Ok(requests
                .iter()
                .map(|_| InferOutput {
                    choices: vec![ChatChoice {
                        message: ChatMessage::assistant("ok"),
                        token_ids: Vec::new(),
                        stop_reason: StopReason::Stop,
                    }],
                })
                .collect())
        }

        fn load_weights(&mut self, _weights: Vec<(String, Tensor)>) -> crate::Result<()> {
            self.events.lock().unwrap().push("weights_loaded".to_string());
            Ok(())
        }

        fn sleep(&mut self, _level: u8) {
            self.events.lock().unwrap().push("sleep".to_string());
            self.sleeping = true;
        }

        fn wake_up(&mut self) {
            self.events.lock().unwrap().push("wake".to_string());
            self.sleeping = false;
        }

        fn is_sleeping(&self) -> bool {
            self.sleeping
        }
    }

    #[test]
    fn training_memory_is_released_before_the_engine_wakes() {
        let events = Arc::new(Mutex::new(Vec::<String>::new()));
        let collective = ThreadCollective::local_group(1, 8).remove(0);
        let mut config = GrpoConfig::default()
            .with_num_generations(2)
            .with_per_device_batch(2);
        config.sleep_level = 1;
        config.offload_model = true;
        config.offload_optimizer = true;

        let engine: Arc<Mutex<dyn InferenceEngine>> = Arc::new(Mutex::new(EventEngine {
            events: events.clone(),
            sleeping: true,
        }));
        let shards = vec![WeightShard {
            names: vec!["model.layers.0.weight".to_string()],
        }];
        let mut coordinator =
            RolloutCoordinator::new(config, Arc::new(collective), Some(engine), shards).unwrap();
        let mut model = EventModel {
            events: events.clone(),
            device: Device::Cuda(0),
        };
        let mut optimizer = EventOptimizer {
            events: events.clone(),
            device: Device::Cuda(0),
        };

        coordinator
            .generate(0, &mut model, &mut optimizer, vec![prompt(0, 0), prompt(0, 1)])
            .unwrap();

        let events = events.lock().unwrap();
        let pos = |name: &str| {
            events
                .iter()
                .position(|e| e == name)
                .unwrap_or_else(|| panic!("missing event {} in {:?}", name, *events))
        };
        // Offload first, then wake and push weights, generate, sleep, and only
        // then bring the training state back.
        assert!(pos("model_offloaded") < pos("wake"));
        assert!(pos("optimizer_offloaded") < pos("wake"));
        assert!(pos("wake") < pos("weights_loaded"));
        assert!(pos("weights_loaded") < pos("infer"));
        assert!(pos("infer") < pos("sleep"));
        assert!(pos("sleep") < pos("model_restored"));
        assert!(pos("sleep") < pos("optimizer_restored"));
    }

    #[test]
    fn sleep_cycle_wraps_generation() {
        let collective = ThreadCollective::local_group(1, 8).remove(0);
        let mut config = GrpoConfig::default()
            .with_num_generations(2)
            .with_per_device_batch(2);
        config.sleep_level = 1;
        let engine = Arc::new(Mutex::new(EchoEngine {
            id: 0,
            sleeping: true,
        }));
        let shared: Arc<Mutex<dyn InferenceEngine>> = engine.clone();
        let mut coordinator =
            RolloutCoordinator::new(config, Arc::new(collective), Some(shared), Vec::new())
                .unwrap();
        let mut model = crate::model::TensorMapModel::new();
        let mut optimizer = crate::model::TensorMapOptimizer::default();

        coordinator
            .generate(0, &mut model, &mut optimizer, vec![prompt(0, 0), prompt(0, 1)])
            .unwrap();
        // Woken for the sync and generation, put back to sleep afterwards.
        assert!(engine.lock().unwrap().is_sleeping());
    }

    #[test]
    fn infer_rank_accounts_for_node_offset() {
        let config = GrpoConfig::default()
            .with_infer_workers(2)
            .with_tensor_parallel(2);
        let topology = crate::distributed::ProcessTopology {
            rank: 5,
            local_rank: 1,
            world_size: 8,
            local_world_size: 4,
            node: 1,
            num_nodes: 2,
            device_count: 8,
        };
        struct FixedTopology(crate::distributed::ProcessTopology);
        impl Collective for FixedTopology {
            fn topology(&self) -> crate::distributed::ProcessTopology {
                self.0
            }
            fn gather_values(&self, payload: serde_json::Value) -> Vec<serde_json::Value> {
                vec![payload]
            }
            fn barrier(&self) {}
        }
        let engine: Arc<Mutex<dyn InferenceEngine>> = Arc::new(Mutex::new(EchoEngine {
            id: 0,
            sleeping: false,
        }));
        let coordinator = RolloutCoordinator::new(
            config,
            Arc::new(FixedTopology(topology)),
            Some(engine),
            Vec::new(),
        )
        .unwrap();

        assert_eq!(coordinator.infer_rank(), Some(3));
        // local_rank 1 is not a tensor-parallel group leader.
        assert_eq!(coordinator.infer_rank_tp0(), None);
    }
}
