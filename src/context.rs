//! A manager for the state of a discrete-event simulation
//!
//! Defines a `Context` that is intended to provide the foundational mechanism
//! for storing and manipulating the state of a given simulation.
use std::any::Any;
use std::cell::OnceCell;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::log::trace;
use crate::plan::{PlanId, Queue};

/// The maximum number of distinct data plugins a program may declare.
const MAX_DATA_PLUGINS: usize = 64;

static NEXT_DATA_PLUGIN_INDEX: AtomicUsize = AtomicUsize::new(0);

/// A trait for objects that can provide data containers to be held by `Context`
pub trait DataPlugin: Any {
    type DataContainer;

    fn init() -> Self::DataContainer;

    /// The slot this plugin occupies in every `Context`. Assigned once per program run.
    fn index_within_context() -> usize;
}

/// Assigns the next free slot to a data plugin whose `INDEX` static is still
/// uninitialized. Safe to race: the loser adopts the winner's index.
#[doc(hidden)]
pub fn initialize_data_plugin_index(index: &AtomicUsize) -> usize {
    let candidate = NEXT_DATA_PLUGIN_INDEX.fetch_add(1, Ordering::Relaxed);
    assert!(
        candidate < MAX_DATA_PLUGINS,
        "too many data plugins (limit {MAX_DATA_PLUGINS})"
    );
    match index.compare_exchange(usize::MAX, candidate, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => candidate,
        Err(existing) => existing,
    }
}

/// Defines a new type for storing data in Context.
#[macro_export]
macro_rules! define_data_plugin {
    ($data_plugin:ident, $data_container:ty, $default:expr) => {
        struct $data_plugin;

        impl $crate::context::DataPlugin for $data_plugin {
            type DataContainer = $data_container;

            fn init() -> Self::DataContainer {
                $default
            }

            fn index_within_context() -> usize {
                // `usize::MAX` is the sentinel for "uninitialized". This static is shared
                // among all instances of this data plugin type.
                static INDEX: std::sync::atomic::AtomicUsize =
                    std::sync::atomic::AtomicUsize::new(usize::MAX);

                let index = INDEX.load(std::sync::atomic::Ordering::Relaxed);
                if index != usize::MAX {
                    return index;
                }
                $crate::context::initialize_data_plugin_index(&INDEX)
            }
        }
    };
}
pub use define_data_plugin;

/// The order in which plans scheduled for the same time are executed.
///
/// Scripted interventions run `First` so that the daily step observes them,
/// the daily step itself runs `Normal`, and reporting runs `Last`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExecutionPhase {
    First,
    Normal,
    Last,
}

impl Display for ExecutionPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

type Callback = dyn FnOnce(&mut Context);

/// A manager for the state of a discrete-event simulation
///
/// Provides core simulation services including
/// * Maintaining a notion of time
/// * Scheduling events to occur at some point in the future and executing them
///   at that time
/// * Storing data that can be retrieved by modules
///
/// The `Context` holds no global state: two contexts never share random
/// streams, data, or plans, so independent replicates can each own one on
/// their own thread.
pub struct Context {
    plan_queue: Queue<Box<Callback>, ExecutionPhase>,
    data_plugins: Box<[OnceCell<Box<dyn Any>>]>,
    current_time: f64,
    shutdown_requested: bool,
}

impl Context {
    /// Create a new empty `Context`
    #[must_use]
    pub fn new() -> Context {
        let data_plugins = (0..MAX_DATA_PLUGINS).map(|_| OnceCell::new()).collect();
        Context {
            plan_queue: Queue::new(),
            data_plugins,
            current_time: 0.0,
            shutdown_requested: false,
        }
    }

    /// Add a plan to the future event list at the specified time in the normal
    /// phase
    ///
    /// # Panics
    ///
    /// Panics if time is in the past, infinite, or NaN.
    pub fn add_plan(&mut self, time: f64, callback: impl FnOnce(&mut Context) + 'static) -> PlanId {
        self.add_plan_with_phase(time, callback, ExecutionPhase::Normal)
    }

    /// Add a plan to the future event list at the specified time and with the
    /// specified phase
    ///
    /// # Panics
    ///
    /// Panics if time is in the past, infinite, or NaN.
    pub fn add_plan_with_phase(
        &mut self,
        time: f64,
        callback: impl FnOnce(&mut Context) + 'static,
        phase: ExecutionPhase,
    ) -> PlanId {
        assert!(
            !time.is_nan() && !time.is_infinite() && time >= self.current_time,
            "Time {time} is invalid"
        );
        trace!("adding plan at {time} in phase {phase}");
        self.plan_queue.add_plan(time, Box::new(callback), phase)
    }

    /// Request that the simulation stop after the current callback returns.
    /// Pending plans are discarded.
    pub fn shutdown(&mut self) {
        trace!("shutdown requested at {}", self.current_time);
        self.shutdown_requested = true;
    }

    #[must_use]
    pub fn get_current_time(&self) -> f64 {
        self.current_time
    }

    /// Retrieve a reference to the data container associated with a
    /// `DataPlugin`, creating it with its default value on first use.
    #[must_use]
    #[allow(clippy::needless_pass_by_value)]
    pub fn get_data<T: DataPlugin>(&self, _plugin: T) -> &T::DataContainer {
        self.data_plugins[T::index_within_context()]
            .get_or_init(|| Box::new(T::init()))
            .downcast_ref::<T::DataContainer>()
            .expect("data plugin slot holds a different type")
    }

    /// Retrieve a mutable reference to the data container associated with a
    /// `DataPlugin`, creating it with its default value on first use.
    #[allow(clippy::needless_pass_by_value)]
    pub fn get_data_mut<T: DataPlugin>(&mut self, _plugin: T) -> &mut T::DataContainer {
        let cell = &mut self.data_plugins[T::index_within_context()];
        if cell.get().is_none() {
            let _ = cell.set(Box::new(T::init()));
        }
        cell.get_mut()
            .and_then(|data| data.downcast_mut::<T::DataContainer>())
            .expect("data plugin slot holds a different type")
    }

    /// Execute the simulation until there are no more plans to process or a
    /// shutdown has been requested
    pub fn execute(&mut self) {
        trace!("entering event loop");
        loop {
            if self.shutdown_requested {
                break;
            }
            match self.plan_queue.get_next_plan() {
                Some(plan) => {
                    self.current_time = plan.time;
                    #[cfg(feature = "progress_bar")]
                    if crate::progress::MAX_TIME.get().is_some() {
                        crate::progress::update_timeline_progress(self.current_time);
                    }
                    (plan.data)(self);
                }
                None => break,
            }
        }
        trace!("leaving event loop at {}", self.current_time);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    define_data_plugin!(ComponentA, Vec<u32>, vec![]);
    define_data_plugin!(ComponentB, u32, 7);

    fn add_plan(context: &mut Context, time: f64, value: u32) -> PlanId {
        context.add_plan(time, move |context| {
            context.get_data_mut(ComponentA).push(value);
        })
    }

    #[test]
    #[should_panic(expected = "Time -1 is invalid")]
    fn negative_plan_time() {
        let mut context = Context::new();
        add_plan(&mut context, -1.0, 0);
    }

    #[test]
    #[should_panic(expected = "Time inf is invalid")]
    fn infinite_plan_time() {
        let mut context = Context::new();
        add_plan(&mut context, f64::INFINITY, 0);
    }

    #[test]
    #[should_panic(expected = "Time NaN is invalid")]
    fn nan_plan_time() {
        let mut context = Context::new();
        add_plan(&mut context, f64::NAN, 0);
    }

    #[test]
    fn empty_context() {
        let mut context = Context::new();
        context.execute();
        assert_eq!(context.get_current_time(), 0.0);
    }

    #[test]
    fn data_plugins_are_independent_and_lazy() {
        let mut context = Context::new();
        assert_eq!(*context.get_data(ComponentB), 7);
        context.get_data_mut(ComponentA).push(1);
        *context.get_data_mut(ComponentB) = 9;
        assert_eq!(*context.get_data(ComponentA), vec![1]);
        assert_eq!(*context.get_data(ComponentB), 9);

        // A second context starts from the defaults
        let other = Context::new();
        assert!(other.get_data(ComponentA).is_empty());
    }

    #[test]
    fn timed_plan_only() {
        let mut context = Context::new();
        add_plan(&mut context, 1.0, 1);
        context.execute();
        assert_eq!(context.get_current_time(), 1.0);
        assert_eq!(*context.get_data(ComponentA), vec![1]);
    }

    #[test]
    fn plan_adds_plan_at_current_time() {
        let mut context = Context::new();
        context.add_plan(1.0, move |context| {
            context.get_data_mut(ComponentA).push(1);
            add_plan(context, 1.0, 2);
        });
        context.execute();
        assert_eq!(context.get_current_time(), 1.0);
        assert_eq!(*context.get_data(ComponentA), vec![1, 2]);
    }

    #[test]
    fn plans_at_same_time_fire_in_order() {
        let mut context = Context::new();
        add_plan(&mut context, 1.0, 1);
        add_plan(&mut context, 1.0, 2);
        context.execute();
        assert_eq!(*context.get_data(ComponentA), vec![1, 2]);
    }

    #[test]
    fn phases_order_plans_at_same_time() {
        let mut context = Context::new();
        context.add_plan_with_phase(
            1.0,
            |context| context.get_data_mut(ComponentA).push(3),
            ExecutionPhase::Last,
        );
        add_plan(&mut context, 1.0, 2);
        context.add_plan_with_phase(
            1.0,
            |context| context.get_data_mut(ComponentA).push(1),
            ExecutionPhase::First,
        );
        context.execute();
        assert_eq!(*context.get_data(ComponentA), vec![1, 2, 3]);
    }

    #[test]
    fn shutdown_discards_remaining_plans() {
        let mut context = Context::new();
        add_plan(&mut context, 1.0, 1);
        context.add_plan(1.5, Context::shutdown);
        add_plan(&mut context, 2.0, 2);
        context.execute();
        assert_eq!(context.get_current_time(), 1.5);
        assert_eq!(*context.get_data(ComponentA), vec![1]);
    }
}
