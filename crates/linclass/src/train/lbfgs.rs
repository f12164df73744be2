//! The minimize service of the batch trainer: argmin's L-BFGS (OWL-QN when an
//! L1 coefficient is set) behind a narrow [`Objective`] / [`Minimizer`] seam.
//!
//! The solver runs on a scoped worker thread. Every accepted iterate is sent
//! back to the calling thread, which applies the delta-window stopping test and
//! hands the iterate to the progress callback. Dropping the receiving end stops
//! the solver at its next iteration.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;

use argmin::core::observers::{Observe, ObserverMode};
use argmin::core::{
    CostFunction, Error, Executor, Gradient, State, TerminationReason, TerminationStatus, KV,
};
use argmin::solver::linesearch::condition::ArmijoCondition;
use argmin::solver::linesearch::{BacktrackingLineSearch, MoreThuenteLineSearch};
use argmin::solver::quasinewton::LBFGS;
use ndarray::Array1;

use crate::config::{LbfgsParams, LineSearch};

type MoreThuenteLs = MoreThuenteLineSearch<Array1<f64>, Array1<f64>, f64>;
type BacktrackingLs = BacktrackingLineSearch<Array1<f64>, Array1<f64>, ArmijoCondition<f64>, f64>;

/// Function minimized by a [`Minimizer`].
pub trait Objective: Send {
    /// Writes the gradient at `x` into `g` and returns the function value.
    fn evaluate(&mut self, x: &Array1<f64>, g: &mut Array1<f64>) -> f64;
}

/// Report handed to the progress callback after every accepted iterate.
#[derive(Debug, Clone)]
pub struct Progress {
    pub iteration: usize,
    pub x: Array1<f64>,
    pub fx: f64,
    pub xnorm: f64,
    pub gnorm: f64,
    /// Objective evaluations spent on this iteration.
    pub num_linesearch: usize,
    /// Length of the move from the previous iterate.
    pub step: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverStatus {
    /// The gradient test was satisfied.
    Success,
    /// The relative improvement over the delta window fell below `delta`.
    Stopped,
    /// The initial point already satisfies the gradient test.
    AlreadyMinimized,
    MaxIterations,
    Cancelled,
    /// One iteration used more than `max_linesearch` evaluations.
    LineSearchFailed,
    NumericalError,
    /// Any other solver failure.
    Failed(String),
}

impl SolverStatus {
    /// `true` for the statuses that mean the solution converged.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            SolverStatus::Success | SolverStatus::Stopped | SolverStatus::AlreadyMinimized
        )
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SolverStatus::Success => f.write_str("L-BFGS resulted in convergence"),
            SolverStatus::Stopped => f.write_str("L-BFGS terminated with the stopping criteria"),
            SolverStatus::AlreadyMinimized => {
                f.write_str("the initial variables already minimize the objective function")
            }
            SolverStatus::MaxIterations => {
                f.write_str("L-BFGS terminated with the maximum number of iterations")
            }
            SolverStatus::Cancelled => f.write_str("the minimization process has been canceled"),
            SolverStatus::LineSearchFailed => {
                f.write_str("the line-search routine reached the maximum number of evaluations")
            }
            SolverStatus::NumericalError => {
                f.write_str("the objective or its gradient is not a finite number")
            }
            SolverStatus::Failed(msg) => write!(f, "L-BFGS failed: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    pub status: SolverStatus,
    /// Objective value at the returned point.
    pub fx: f64,
    pub iterations: usize,
}

/// Something that can drive an [`Objective`] towards a minimum.
///
/// On return `x` holds the last accepted iterate, whatever the status.
/// Returning `false` from `progress` cancels the minimization.
pub trait Minimizer {
    fn minimize(
        &self,
        x: &mut Array1<f64>,
        objective: &mut dyn Objective,
        progress: &mut dyn FnMut(&Progress) -> bool,
    ) -> SolverOutcome;
}

#[derive(Debug, Clone)]
pub struct Lbfgs {
    pub num_memories: usize,
    pub epsilon: f64,
    /// Window of the delta test; `0` disables it.
    pub past: usize,
    pub delta: f64,
    pub max_iterations: usize,
    pub linesearch: LineSearch,
    pub max_linesearch: usize,
    /// L1 coefficient; `0.0` disables the orthant-wise mode.
    pub l1: f64,
}

impl Default for Lbfgs {
    fn default() -> Self {
        Lbfgs::new(&LbfgsParams::default())
    }
}

/// Reasons a run is interrupted from inside the objective or the observer.
#[derive(Debug)]
enum Interrupt {
    Cancelled,
    NonFinite,
    TooManyEvaluations,
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for Interrupt {}

/// State shared by the objective adapter and the observer on the worker thread.
#[derive(Default)]
struct Shared {
    gnorm: Mutex<f64>,
    evaluations: AtomicUsize,
}

/// argmin view of an [`Objective`]; value and gradient come from one sweep.
struct Problem<'o> {
    objective: RefCell<&'o mut dyn Objective>,
    cache: RefCell<Option<(Array1<f64>, f64, Array1<f64>)>>,
    shared: Arc<Shared>,
    max_evaluations: usize,
}

impl Problem<'_> {
    fn eval(&self, x: &Array1<f64>) -> Result<(f64, Array1<f64>), Error> {
        if let Some((cx, f, g)) = self.cache.borrow().as_ref() {
            if cx == x {
                return Ok((*f, g.clone()));
            }
        }
        let n = self.shared.evaluations.fetch_add(1, Ordering::Relaxed) + 1;
        if n > self.max_evaluations {
            return Err(Error::new(Interrupt::TooManyEvaluations));
        }

        let mut g = Array1::zeros(x.len());
        let f = self.objective.borrow_mut().evaluate(x, &mut g);
        if !f.is_finite() || g.iter().any(|v| !v.is_finite()) {
            return Err(Error::new(Interrupt::NonFinite));
        }
        if let Ok(mut gnorm) = self.shared.gnorm.lock() {
            *gnorm = g.dot(&g).sqrt();
        }
        *self.cache.borrow_mut() = Some((x.clone(), f, g.clone()));
        Ok((f, g))
    }
}

impl CostFunction for Problem<'_> {
    type Param = Array1<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, Error> {
        self.eval(x).map(|(f, _)| f)
    }
}

impl Gradient for Problem<'_> {
    type Param = Array1<f64>;
    type Gradient = Array1<f64>;

    fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, Error> {
        self.eval(x).map(|(_, g)| g)
    }
}

/// Sends every accepted iterate to the calling thread.
struct Reporter {
    sender: SyncSender<Progress>,
    shared: Arc<Shared>,
    iteration: usize,
    previous: Array1<f64>,
}

impl<I> Observe<I> for Reporter
where
    I: State<Param = Array1<f64>, Float = f64>,
{
    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), Error> {
        let Some(x) = state.get_param() else {
            return Ok(());
        };
        self.iteration += 1;
        let gnorm = self.shared.gnorm.lock().map(|g| *g).unwrap_or(f64::NAN);
        let moved = x - &self.previous;
        self.previous.assign(x);
        let report = Progress {
            iteration: self.iteration,
            x: x.clone(),
            fx: state.get_cost(),
            xnorm: x.dot(x).sqrt(),
            gnorm,
            num_linesearch: self.shared.evaluations.swap(0, Ordering::Relaxed),
            step: moved.dot(&moved).sqrt(),
        };
        self.sender
            .send(report)
            .map_err(|_| Error::new(Interrupt::Cancelled))
    }
}

/// Best point, its value, iteration count and termination of a finished run.
type RunResult = (Option<Array1<f64>>, f64, usize, TerminationStatus);

impl Lbfgs {
    pub fn new(params: &LbfgsParams) -> Self {
        Lbfgs {
            num_memories: params.num_memories.max(1),
            epsilon: params.epsilon,
            past: params.stop,
            delta: params.delta,
            max_iterations: params.max_iterations,
            linesearch: params.linesearch,
            max_linesearch: params.max_linesearch.max(1),
            l1: 0.0,
        }
    }

    /// Adds the term `c * sum |x_i|`; forces the backtracking line search.
    pub fn with_l1(mut self, c: f64) -> Self {
        self.l1 = c;
        if c != 0.0 {
            self.linesearch = LineSearch::Backtracking;
        }
        self
    }

    fn run(&self, problem: Problem<'_>, x0: Array1<f64>, reporter: Reporter) -> Result<RunResult, Error> {
        let max_iters = if self.max_iterations == 0 {
            u64::MAX
        } else {
            self.max_iterations as u64
        };
        let (memories, epsilon, l1) = (self.num_memories, self.epsilon, self.l1);

        macro_rules! execute {
            ($linesearch:expr) => {{
                let mut solver = LBFGS::new($linesearch, memories).with_tolerance_grad(epsilon)?;
                if l1 > 0.0 {
                    solver = solver.with_l1_regularization(l1)?;
                }
                let result = Executor::new(problem, solver)
                    .configure(|state| state.param(x0).max_iters(max_iters))
                    .add_observer(reporter, ObserverMode::Always)
                    .run()?;
                let state = result.state();
                (
                    state.get_best_param().cloned(),
                    state.get_best_cost(),
                    state.get_iter() as usize,
                    state.get_termination_status().clone(),
                )
            }};
        }

        let result = match self.linesearch {
            LineSearch::MoreThuente => execute!(MoreThuenteLs::new()),
            LineSearch::Backtracking => {
                execute!(BacktrackingLs::new(ArmijoCondition::new(1e-4)?))
            }
        };
        Ok(result)
    }
}

/// Delta-window test: `(f(k - past) - f(k)) / f(k) < delta`.
struct DeltaWindow {
    past: usize,
    delta: f64,
    history: VecDeque<f64>,
}

impl DeltaWindow {
    fn new(past: usize, delta: f64, f0: f64) -> Self {
        let mut history = VecDeque::with_capacity(past.max(1));
        history.push_back(f0);
        DeltaWindow {
            past,
            delta,
            history,
        }
    }

    fn converged(&mut self, fx: f64) -> bool {
        if self.past == 0 {
            return false;
        }
        let mut stop = false;
        if self.history.len() >= self.past {
            if let Some(&old) = self.history.front() {
                stop = (old - fx) / fx.abs().max(f64::MIN_POSITIVE) < self.delta;
            }
            self.history.pop_front();
        }
        self.history.push_back(fx);
        stop
    }
}

impl Minimizer for Lbfgs {
    fn minimize(
        &self,
        x: &mut Array1<f64>,
        objective: &mut dyn Objective,
        progress: &mut dyn FnMut(&Progress) -> bool,
    ) -> SolverOutcome {
        let mut g = Array1::zeros(x.len());
        let fx0 = objective.evaluate(x, &mut g);
        if !fx0.is_finite() || g.iter().any(|v| !v.is_finite()) {
            return SolverOutcome {
                status: SolverStatus::NumericalError,
                fx: fx0,
                iterations: 0,
            };
        }
        let gnorm = g.dot(&g).sqrt();
        let xnorm = x.dot(&*x).sqrt();
        if self.l1 == 0.0 && gnorm / xnorm.max(1.0) <= self.epsilon {
            return SolverOutcome {
                status: SolverStatus::AlreadyMinimized,
                fx: fx0,
                iterations: 0,
            };
        }

        let shared = Arc::new(Shared::default());
        let (sender, receiver) = sync_channel::<Progress>(1);
        let problem = Problem {
            objective: RefCell::new(objective),
            cache: RefCell::new(Some((x.clone(), fx0, g))),
            shared: Arc::clone(&shared),
            max_evaluations: self.max_linesearch,
        };
        let x0 = x.clone();
        let reporter = Reporter {
            sender,
            shared,
            iteration: 0,
            previous: x0.clone(),
        };

        let mut window = DeltaWindow::new(self.past, self.delta, fx0);
        let mut last: Option<Progress> = None;
        let mut interrupted = None;
        let result = thread::scope(|scope| {
            let worker = scope.spawn(move || self.run(problem, x0, reporter));
            for report in receiver.iter() {
                let keep_going = progress(&report);
                let stop = window.converged(report.fx);
                last = Some(report);
                if !keep_going {
                    interrupted = Some(SolverStatus::Cancelled);
                    break;
                }
                if stop {
                    interrupted = Some(SolverStatus::Stopped);
                    break;
                }
            }
            drop(receiver);
            worker
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        });

        let iterations = last.as_ref().map(|p| p.iteration).unwrap_or(0);
        let last_fx = last.as_ref().map(|p| p.fx).unwrap_or(fx0);
        if let Some(status) = interrupted {
            if let Some(report) = last {
                *x = report.x;
            }
            return SolverOutcome {
                status,
                fx: last_fx,
                iterations,
            };
        }

        match result {
            Ok((best, fx, iters, termination)) => {
                if let Some(best) = best {
                    *x = best;
                }
                let status = match termination {
                    TerminationStatus::Terminated(TerminationReason::SolverConverged)
                    | TerminationStatus::Terminated(TerminationReason::TargetCostReached) => {
                        SolverStatus::Success
                    }
                    TerminationStatus::Terminated(TerminationReason::MaxItersReached) => {
                        SolverStatus::MaxIterations
                    }
                    other => SolverStatus::Failed(format!("{:?}", other)),
                };
                SolverOutcome {
                    status,
                    fx,
                    iterations: iters.max(iterations),
                }
            }
            Err(err) => {
                if let Some(report) = last {
                    *x = report.x;
                }
                let status = match err.downcast_ref::<Interrupt>() {
                    Some(Interrupt::Cancelled) => SolverStatus::Cancelled,
                    Some(Interrupt::NonFinite) => SolverStatus::NumericalError,
                    Some(Interrupt::TooManyEvaluations) => SolverStatus::LineSearchFailed,
                    None => SolverStatus::Failed(err.to_string()),
                };
                SolverOutcome {
                    status,
                    fx: last_fx,
                    iterations,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `sum_i (i + 1) * (x_i - 1)^2`.
    struct Quadratic {
        evaluations: usize,
    }

    impl Objective for Quadratic {
        fn evaluate(&mut self, x: &Array1<f64>, g: &mut Array1<f64>) -> f64 {
            self.evaluations += 1;
            let mut f = 0.0;
            for i in 0..x.len() {
                let w = (i + 1) as f64;
                let r = x[i] - 1.0;
                f += w * r * r;
                g[i] = 2.0 * w * r;
            }
            f
        }
    }

    /// Sum of independent 2-D Rosenbrock valleys.
    struct Rosenbrock;

    impl Objective for Rosenbrock {
        fn evaluate(&mut self, x: &Array1<f64>, g: &mut Array1<f64>) -> f64 {
            let mut f = 0.0;
            g.fill(0.0);
            for i in (0..x.len()).step_by(2) {
                let (a, b) = (x[i], x[i + 1]);
                f += (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2);
                g[i] += -2.0 * (1.0 - a) - 400.0 * a * (b - a * a);
                g[i + 1] += 200.0 * (b - a * a);
            }
            f
        }
    }

    struct Poisoned;

    impl Objective for Poisoned {
        fn evaluate(&mut self, _x: &Array1<f64>, g: &mut Array1<f64>) -> f64 {
            g.fill(1.0);
            f64::NAN
        }
    }

    fn solver(linesearch: LineSearch) -> Lbfgs {
        let mut params = LbfgsParams::default();
        params.linesearch = linesearch;
        params.stop = 0;
        params.max_iterations = 200;
        params.max_linesearch = 40;
        Lbfgs::new(&params)
    }

    fn always(_: &Progress) -> bool {
        true
    }

    #[test]
    fn quadratic_converges_with_both_line_searches() {
        for ls in [LineSearch::MoreThuente, LineSearch::Backtracking] {
            let mut x = Array1::zeros(5);
            let mut obj = Quadratic { evaluations: 0 };
            let out = solver(ls).minimize(&mut x, &mut obj, &mut always);
            assert_ne!(out.status, SolverStatus::NumericalError, "{:?}", ls);
            for v in x.iter() {
                assert!((v - 1.0).abs() < 1e-3, "{:?}: {}", ls, v);
            }
        }
    }

    #[test]
    fn rosenbrock_reaches_the_valley_floor() {
        let mut x = Array1::from(vec![-1.2, 1.0]);
        let out = solver(LineSearch::MoreThuente).minimize(&mut x, &mut Rosenbrock, &mut always);
        assert_ne!(out.status, SolverStatus::NumericalError);
        assert!((x[0] - 1.0).abs() < 1e-2 && (x[1] - 1.0).abs() < 1e-2);
    }

    #[test]
    fn starting_at_the_minimum_is_reported() {
        let mut x = Array1::from_elem(3, 1.0);
        let mut obj = Quadratic { evaluations: 0 };
        let out = Lbfgs::default().minimize(&mut x, &mut obj, &mut always);
        assert_eq!(out.status, SolverStatus::AlreadyMinimized);
        assert_eq!(obj.evaluations, 1);
    }

    #[test]
    fn iteration_cap_is_honoured() {
        let mut params = LbfgsParams::default();
        params.max_iterations = 1;
        params.stop = 0;
        let mut x = Array1::zeros(4);
        let out = Lbfgs::new(&params).minimize(&mut x, &mut Rosenbrock, &mut always);
        assert_eq!(out.status, SolverStatus::MaxIterations);
    }

    #[test]
    fn progress_can_cancel() {
        let mut x = Array1::zeros(2);
        let mut seen = Vec::new();
        let mut progress = |p: &Progress| {
            seen.push(p.iteration);
            p.iteration < 2
        };
        let out = solver(LineSearch::MoreThuente).minimize(&mut x, &mut Rosenbrock, &mut progress);
        assert_eq!(out.status, SolverStatus::Cancelled);
        assert_eq!(out.iterations, 2);
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn non_finite_objective_is_a_numerical_error() {
        let mut x = Array1::zeros(3);
        let out = Lbfgs::default().minimize(&mut x, &mut Poisoned, &mut always);
        assert_eq!(out.status, SolverStatus::NumericalError);
        assert_eq!(x, Array1::<f64>::zeros(3));
    }

    #[test]
    fn delta_window_stops_on_a_plateau() {
        let mut window = DeltaWindow::new(2, 1e-3, 10.0);
        assert!(!window.converged(5.0));
        assert!(!window.converged(5.0));
        // Compared with f(k - 2) = 5.0.
        assert!(window.converged(4.9999));
        assert!(!DeltaWindow::new(0, 1.0, 1.0).converged(1.0));
    }

    #[test]
    fn l1_term_zeroes_weak_coordinates() {
        // Unpenalized minimum at 1.0 for every coordinate; the L1 pull of 3.0
        // exceeds the curvature of the first coordinate (2 * 1 = 2) only.
        let mut x = Array1::zeros(3);
        let mut obj = Quadratic { evaluations: 0 };
        let out = solver(LineSearch::MoreThuente)
            .with_l1(3.0)
            .minimize(&mut x, &mut obj, &mut always);
        assert_ne!(out.status, SolverStatus::NumericalError);
        assert!(x[0].abs() < 1e-6, "{}", x[0]);
        // Closed form: x_i = 1 - c / (2 (i + 1)).
        assert!((x[1] - 0.25).abs() < 1e-3, "{}", x[1]);
        assert!((x[2] - 0.5).abs() < 1e-3, "{}", x[2]);
    }
}
