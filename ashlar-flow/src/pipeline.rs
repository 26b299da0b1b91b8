//! The staged pipeline: an ordered list of idempotent stages executed on
//! a single worker thread, reporting progress through the event queue.
//! "Run up to stage S" re-runs only the span from the first not-done
//! stage through S; an error stops the run and leaves earlier done flags
//! in place.

use anyhow::{anyhow, Result};
use ashlar_common::database::Design;
use ashlar_common::lockable::Lockable;
use ashlar_common::mtqueue::MtQueue;
use log::error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageState {
    Running,
    Progress(u8),
    DoneOk,
    DoneError(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageEvent {
    pub stage: &'static str,
    pub state: StageState,
}

/// Coarse stage status readable without draining events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum StageStatus {
    Reset = 0,
    Running = 1,
    DoneOk = 2,
    DoneError = 3,
}

#[derive(Debug, Default)]
struct StatusCell(AtomicU8);

impl StatusCell {
    fn store(&self, status: StageStatus) {
        self.0.store(status as u8, Ordering::SeqCst);
    }

    fn load(&self) -> StageStatus {
        match self.0.load(Ordering::SeqCst) {
            1 => StageStatus::Running,
            2 => StageStatus::DoneOk,
            3 => StageStatus::DoneError,
            _ => StageStatus::Reset,
        }
    }
}

/// Handle given to an executing stage for progress reporting.
pub struct StageContext<'a> {
    stage: &'static str,
    events: &'a MtQueue<StageEvent>,
}

impl StageContext<'_> {
    pub fn progress(&self, percent: u8) {
        self.events.push(StageEvent {
            stage: self.stage,
            state: StageState::Progress(percent.min(100)),
        });
    }
}

/// One pipeline step. Stages keep no design state of their own; given the
/// same inputs, re-running a stage reproduces its result.
pub trait Stage: Send {
    fn name(&self) -> &'static str;
    fn execute(&mut self, design: &mut Design, ctx: &StageContext<'_>) -> Result<()>;
}

struct Shared {
    design: Arc<Lockable<Design>>,
    events: Arc<MtQueue<StageEvent>>,
    stages: Mutex<Vec<Box<dyn Stage>>>,
    done: Vec<AtomicBool>,
    status: Vec<StatusCell>,
    names: Vec<&'static str>,
}

pub struct Pipeline {
    shared: Arc<Shared>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        let names: Vec<&'static str> = stages.iter().map(|s| s.name()).collect();
        let done = names.iter().map(|_| AtomicBool::new(false)).collect();
        let status = names.iter().map(|_| StatusCell::default()).collect();
        Self {
            shared: Arc::new(Shared {
                design: Arc::new(Lockable::new(Design::new())),
                events: Arc::new(MtQueue::new()),
                stages: Mutex::new(stages),
                done,
                status,
                names,
            }),
        }
    }

    pub fn design(&self) -> Arc<Lockable<Design>> {
        Arc::clone(&self.shared.design)
    }

    pub fn events(&self) -> Arc<MtQueue<StageEvent>> {
        Arc::clone(&self.shared.events)
    }

    pub fn stage_names(&self) -> &[&'static str] {
        &self.shared.names
    }

    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.shared.names.iter().position(|&n| n == name)
    }

    pub fn is_done(&self, index: usize) -> bool {
        self.shared.done[index].load(Ordering::SeqCst)
    }

    pub fn status(&self, index: usize) -> StageStatus {
        self.shared.status[index].load()
    }

    /// Mark a stage (and implicitly its successors) for re-execution.
    pub fn invalidate_from(&self, index: usize) {
        for done in self.shared.done.iter().skip(index) {
            done.store(false, Ordering::SeqCst);
        }
    }

    /// Launch a worker thread running every not-done stage up to and
    /// including `target`. Cancellation is coarse: drop the handle and
    /// start a new pipeline.
    pub fn run_up_to(&self, target: &str) -> Result<JoinHandle<()>> {
        let target_index = self
            .stage_index(target)
            .ok_or_else(|| anyhow!("unknown stage {:?}", target))?;

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::spawn(move || {
            let mut stages = shared
                .stages
                .lock()
                .unwrap_or_else(|e| e.into_inner());

            let first = (0..=target_index)
                .find(|&i| !shared.done[i].load(Ordering::SeqCst))
                .unwrap_or(target_index + 1);

            for index in first..=target_index {
                let name = shared.names[index];
                shared.status[index].store(StageStatus::Running);
                shared.events.push(StageEvent {
                    stage: name,
                    state: StageState::Running,
                });

                let result = {
                    let ctx = StageContext {
                        stage: name,
                        events: shared.events.as_ref(),
                    };
                    let design = &shared.design;
                    let stage = &mut stages[index];
                    catch_unwind(AssertUnwindSafe(|| {
                        let mut design = design.write();
                        stage.execute(&mut design, &ctx)
                    }))
                    .unwrap_or_else(|panic| {
                        let message = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "stage panicked".to_owned());
                        Err(anyhow!("panic: {}", message))
                    })
                };

                match result {
                    Ok(()) => {
                        shared.done[index].store(true, Ordering::SeqCst);
                        shared.status[index].store(StageStatus::DoneOk);
                        shared.events.push(StageEvent {
                            stage: name,
                            state: StageState::DoneOk,
                        });
                    }
                    Err(err) => {
                        error!("stage {} failed: {:#}", name, err);
                        shared.status[index].store(StageStatus::DoneError);
                        shared.events.push(StageEvent {
                            stage: name,
                            state: StageState::DoneError(format!("{:#}", err)),
                        });
                        // Later stages are not invoked; earlier done
                        // flags stay valid.
                        break;
                    }
                }
            }
        });
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingStage {
        name: &'static str,
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Stage for CountingStage {
        fn name(&self) -> &'static str {
            self.name
        }

        fn execute(&mut self, _design: &mut Design, ctx: &StageContext<'_>) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            ctx.progress(50);
            if self.fail {
                Err(anyhow!("deliberate failure"))
            } else {
                Ok(())
            }
        }
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn drain(events: &MtQueue<StageEvent>) -> Vec<StageEvent> {
        let mut out = Vec::new();
        while let Some(ev) = events.try_pop() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn runs_stages_in_order_and_marks_done() {
        let (a, b) = (counter(), counter());
        let pipeline = Pipeline::new(vec![
            Box::new(CountingStage {
                name: "first",
                runs: Arc::clone(&a),
                fail: false,
            }),
            Box::new(CountingStage {
                name: "second",
                runs: Arc::clone(&b),
                fail: false,
            }),
        ]);

        pipeline.run_up_to("second").unwrap().join().unwrap();

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert!(pipeline.is_done(0) && pipeline.is_done(1));
        assert_eq!(pipeline.status(1), StageStatus::DoneOk);

        let events = drain(&pipeline.events());
        let states: Vec<&StageState> = events
            .iter()
            .filter(|e| e.stage == "first")
            .map(|e| &e.state)
            .collect();
        assert_eq!(
            states,
            vec![
                &StageState::Running,
                &StageState::Progress(50),
                &StageState::DoneOk
            ]
        );
    }

    #[test]
    fn rerun_skips_done_stages() {
        let (a, b) = (counter(), counter());
        let pipeline = Pipeline::new(vec![
            Box::new(CountingStage {
                name: "first",
                runs: Arc::clone(&a),
                fail: false,
            }),
            Box::new(CountingStage {
                name: "second",
                runs: Arc::clone(&b),
                fail: false,
            }),
        ]);

        pipeline.run_up_to("first").unwrap().join().unwrap();
        pipeline.run_up_to("second").unwrap().join().unwrap();

        // "first" completed in run one and is not re-executed.
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_stops_the_run_and_preserves_done_flags() {
        let (a, b, c) = (counter(), counter(), counter());
        let pipeline = Pipeline::new(vec![
            Box::new(CountingStage {
                name: "first",
                runs: Arc::clone(&a),
                fail: false,
            }),
            Box::new(CountingStage {
                name: "second",
                runs: Arc::clone(&b),
                fail: true,
            }),
            Box::new(CountingStage {
                name: "third",
                runs: Arc::clone(&c),
                fail: false,
            }),
        ]);

        pipeline.run_up_to("third").unwrap().join().unwrap();

        assert!(pipeline.is_done(0));
        assert!(!pipeline.is_done(1));
        assert_eq!(pipeline.status(1), StageStatus::DoneError);
        assert_eq!(c.load(Ordering::SeqCst), 0, "third stage must not run");

        let events = drain(&pipeline.events());
        assert!(events.iter().any(|e| matches!(
            e.state,
            StageState::DoneError(ref msg) if msg.contains("deliberate")
        )));
    }

    #[test]
    fn invalidation_forces_rerun() {
        let a = counter();
        let pipeline = Pipeline::new(vec![Box::new(CountingStage {
            name: "first",
            runs: Arc::clone(&a),
            fail: false,
        })]);

        pipeline.run_up_to("first").unwrap().join().unwrap();
        pipeline.invalidate_from(0);
        pipeline.run_up_to("first").unwrap().join().unwrap();

        assert_eq!(a.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_stage_is_an_error() {
        let pipeline = Pipeline::new(vec![]);
        assert!(pipeline.run_up_to("nope").is_err());
    }
}
