//! Partition generation.
//!
//! Every strategy starts from the same primitive: shuffle the roster with the
//! caller's RNG and slice it according to a [`SizePlan`]. Sampling repeats that
//! primitive and keeps the cheapest result; annealing refines one result by
//! swapping members between groups. Rules are enforced by rejecting whole
//! partitions and retrying.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{EngineError, EngineResult};
use crate::models::{Group, Partition, SizePolicy, StudentId};
use crate::services::cost::{CostModel, PairCosts, PairingMap};
use crate::services::rules::RuleSet;

pub const DEFAULT_SAMPLING_ATTEMPTS: usize = 500;
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

/// Cooling schedule for simulated annealing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnealingSchedule {
    pub iterations: usize,
    pub initial_temperature: f64,
    /// Applied after every iteration; must be below 1 for the chain to cool
    pub cooling_rate: f64,
}

impl Default for AnnealingSchedule {
    fn default() -> Self {
        Self {
            iterations: 1000,
            initial_temperature: 100.0,
            cooling_rate: 0.95,
        }
    }
}

/// How a partition is chosen
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    /// One shuffle, no cost awareness
    Random,
    /// Best of `attempts` independent shuffles; ties go to the first found
    Sampling { attempts: usize },
    /// Member swaps between groups from one random start
    Annealing(AnnealingSchedule),
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Annealing(AnnealingSchedule::default())
    }
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Random => "random",
            Strategy::Sampling { .. } => "sampling",
            Strategy::Annealing(_) => "annealing",
        }
    }
}

/// Group sizes for a roster, plus the order in which groups take students
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizePlan {
    sizes: Vec<usize>,
    target: usize,
}

impl SizePlan {
    /// Works out the group sizes for `n` students with target size `group_size`
    pub fn new(n: usize, group_size: usize, policy: SizePolicy) -> EngineResult<Self> {
        if group_size == 0 {
            return Err(EngineError::InvalidArgument(
                "group size must be at least 1".to_string(),
            ));
        }

        let sizes = if n == 0 {
            Vec::new()
        } else if group_size >= n {
            vec![n]
        } else {
            let full = n / group_size;
            let remainder = n % group_size;

            if remainder == 0 {
                vec![group_size; full]
            } else {
                match policy {
                    SizePolicy::EvenOnly => {
                        return Err(EngineError::InvalidArgument(format!(
                            "{} students cannot be split evenly into groups of {}",
                            n, group_size
                        )));
                    }
                    SizePolicy::PreferOversize if remainder <= full => {
                        let mut sizes = vec![group_size + 1; remainder];
                        sizes.extend(std::iter::repeat_n(group_size, full - remainder));
                        sizes
                    }
                    SizePolicy::PreferOversize | SizePolicy::PreferUndersize => {
                        if policy == SizePolicy::PreferOversize {
                            log::warn!(
                                "Remainder {} exceeds {} full groups, using a short group",
                                remainder,
                                full
                            );
                        }
                        let mut sizes = vec![group_size; full];
                        sizes.push(remainder);
                        sizes
                    }
                }
            }
        };

        Ok(Self {
            sizes,
            target: group_size,
        })
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Indices of groups whose size differs from the target
    pub fn irregular(&self) -> impl Iterator<Item = usize> + '_ {
        self.sizes
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s != self.target)
            .map(|(i, _)| i)
    }

    /// Seats in off-size groups
    pub fn irregular_seats(&self) -> usize {
        self.irregular().map(|i| self.sizes[i]).sum()
    }

    /// Cuts an ordered roster into groups.
    ///
    /// With `irregular_first` the off-size groups take students from the front
    /// of `order` before the standard groups do; group positions are unchanged.
    pub fn slice(&self, order: &[StudentId], irregular_first: bool) -> Vec<Vec<StudentId>> {
        let mut fill: Vec<usize> = Vec::with_capacity(self.sizes.len());
        if irregular_first {
            fill.extend(self.irregular());
            fill.extend((0..self.sizes.len()).filter(|i| self.sizes[*i] == self.target));
        } else {
            fill.extend(0..self.sizes.len());
        }

        let mut groups = vec![Vec::new(); self.sizes.len()];
        let mut rest = order;
        for idx in fill {
            let (head, tail) = rest.split_at(self.sizes[idx]);
            groups[idx] = head.to_vec();
            rest = tail;
        }
        groups
    }
}

/// Inputs for one generation call
#[derive(Debug, Clone)]
pub struct PartitionRequest<'a> {
    pub student_ids: &'a [StudentId],
    pub group_size: usize,
    pub size_policy: SizePolicy,
    pub rules: Option<&'a RuleSet>,
    pub pairings: Option<&'a PairingMap>,
    /// Non-standard grouping counts; lower counts are placed in off-size groups first
    pub priority: Option<&'a HashMap<StudentId, i32>>,
    pub now: DateTime<Utc>,
}

impl<'a> PartitionRequest<'a> {
    pub fn new(student_ids: &'a [StudentId], group_size: usize, now: DateTime<Utc>) -> Self {
        Self {
            student_ids,
            group_size,
            size_policy: SizePolicy::default(),
            rules: None,
            pairings: None,
            priority: None,
            now,
        }
    }

    pub fn with_policy(mut self, size_policy: SizePolicy) -> Self {
        self.size_policy = size_policy;
        self
    }

    pub fn with_rules(mut self, rules: &'a RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_pairings(mut self, pairings: &'a PairingMap) -> Self {
        self.pairings = Some(pairings);
        self
    }

    pub fn with_priority(mut self, priority: &'a HashMap<StudentId, i32>) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Everything a strategy needs, prepared once per call
struct Context<'a> {
    student_ids: &'a [StudentId],
    plan: SizePlan,
    priority: Option<&'a HashMap<StudentId, i32>>,
    costs: PairCosts,
}

/// Groups students using a chosen strategy
#[derive(Debug, Clone)]
pub struct Partitioner {
    pub strategy: Strategy,
    pub cost_model: CostModel,
    /// Retry ceiling when rules are supplied
    pub max_attempts: usize,
}

impl Default for Partitioner {
    fn default() -> Self {
        Self::new(Strategy::default())
    }
}

impl Partitioner {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            cost_model: CostModel::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_cost_model(mut self, cost_model: CostModel) -> Self {
        self.cost_model = cost_model;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Splits the roster into groups.
    ///
    /// Returns an empty partition for an empty roster. Fails with
    /// `InvalidArgument` for a zero group size or duplicate ids, and with
    /// `ConstraintUnsatisfiable` when rules are given and no attempt satisfied them.
    pub fn partition<R>(&self, request: &PartitionRequest<'_>, rng: &mut R) -> EngineResult<Partition>
    where
        R: Rng + ?Sized,
    {
        let plan = SizePlan::new(request.student_ids.len(), request.group_size, request.size_policy)?;
        check_unique(request.student_ids)?;

        if request.student_ids.is_empty() {
            return Ok(Partition::empty(request.now));
        }

        let costs = match request.pairings {
            Some(map) => self.cost_model.matrix(map, request.now),
            None => PairCosts::default(),
        };

        let ctx = Context {
            student_ids: request.student_ids,
            plan,
            priority: request.priority,
            costs,
        };

        let (groups, cost) = match request.rules.filter(|r| !r.is_empty()) {
            Some(rules) => self.run_constrained(&ctx, rules, rng)?,
            None => self.run_strategy(&ctx, rng),
        };

        log::debug!(
            "{} partition of {} students into {} groups, cost {}",
            self.strategy.name(),
            request.student_ids.len(),
            groups.len(),
            cost
        );

        let groups = groups
            .into_iter()
            .enumerate()
            .map(|(i, members)| Group {
                name: format!("Group {}", i + 1),
                cost: ctx.costs.group_cost(&members),
                members,
            })
            .collect();

        Ok(Partition {
            groups,
            cost,
            created_at: request.now,
        })
    }

    fn run_constrained<R>(
        &self,
        ctx: &Context<'_>,
        rules: &RuleSet,
        rng: &mut R,
    ) -> EngineResult<(Vec<Vec<StudentId>>, i64)>
    where
        R: Rng + ?Sized,
    {
        for attempt in 1..=self.max_attempts {
            let (groups, cost) = self.run_strategy(ctx, rng);
            if rules.is_valid_partition(&groups) {
                return Ok((groups, cost));
            }
            log::debug!("Attempt {} broke a grouping rule, retrying", attempt);
        }

        Err(EngineError::ConstraintUnsatisfiable {
            attempts: self.max_attempts,
        })
    }

    fn run_strategy<R>(&self, ctx: &Context<'_>, rng: &mut R) -> (Vec<Vec<StudentId>>, i64)
    where
        R: Rng + ?Sized,
    {
        match self.strategy {
            Strategy::Random => {
                let groups = random_groups(ctx, rng);
                let cost = ctx.costs.partition_cost(&groups);
                (groups, cost)
            }
            Strategy::Sampling { attempts } => sample(ctx, attempts, rng),
            Strategy::Annealing(schedule) => anneal(ctx, &schedule, rng),
        }
    }
}

fn check_unique(student_ids: &[StudentId]) -> EngineResult<()> {
    let mut seen = HashSet::with_capacity(student_ids.len());
    for id in student_ids {
        if !seen.insert(*id) {
            return Err(EngineError::InvalidArgument(format!(
                "student {} appears more than once",
                id
            )));
        }
    }
    Ok(())
}

/// Shuffle, seat the least irregular students in off-size groups, then slice per the plan
fn random_groups<R>(ctx: &Context<'_>, rng: &mut R) -> Vec<Vec<StudentId>>
where
    R: Rng + ?Sized,
{
    let mut order = ctx.student_ids.to_vec();
    order.shuffle(rng);

    let seats = ctx.plan.irregular_seats();
    match ctx.priority {
        Some(priority) if seats > 0 => {
            let order = irregular_first(order, seats, priority);
            ctx.plan.slice(&order, true)
        }
        _ => ctx.plan.slice(&order, false),
    }
}

/// Moves the `seats` lowest-count students to the front.
///
/// Ties are broken by shuffled position; everyone else keeps the shuffled order.
fn irregular_first(
    order: Vec<StudentId>,
    seats: usize,
    priority: &HashMap<StudentId, i32>,
) -> Vec<StudentId> {
    let mut ranked = order.clone();
    // stable: equal counts keep their shuffled order
    ranked.sort_by_key(|id| priority.get(id).copied().unwrap_or(0));
    let chosen: HashSet<StudentId> = ranked.into_iter().take(seats).collect();

    let (mut front, rest): (Vec<StudentId>, Vec<StudentId>) =
        order.into_iter().partition(|id| chosen.contains(id));
    front.extend(rest);
    front
}

fn sample<R>(ctx: &Context<'_>, attempts: usize, rng: &mut R) -> (Vec<Vec<StudentId>>, i64)
where
    R: Rng + ?Sized,
{
    let mut best = random_groups(ctx, rng);
    let mut best_cost = ctx.costs.partition_cost(&best);

    for _ in 1..attempts {
        if best_cost == 0 {
            break;
        }
        let candidate = random_groups(ctx, rng);
        let cost = ctx.costs.partition_cost(&candidate);
        if cost < best_cost {
            best = candidate;
            best_cost = cost;
        }
    }

    (best, best_cost)
}

fn anneal<R>(
    ctx: &Context<'_>,
    schedule: &AnnealingSchedule,
    rng: &mut R,
) -> (Vec<Vec<StudentId>>, i64)
where
    R: Rng + ?Sized,
{
    let mut current = random_groups(ctx, rng);
    let mut current_cost = ctx.costs.partition_cost(&current);

    let group_count = current.len();
    if group_count < 2 || current_cost == 0 {
        return (current, current_cost);
    }

    // with priority, off-size groups only trade among themselves so their seats stay assigned
    let irregular: HashSet<usize> = match ctx.priority {
        Some(_) => ctx.plan.irregular().collect(),
        None => HashSet::new(),
    };

    let mut best = current.clone();
    let mut best_cost = current_cost;
    let mut temperature = schedule.initial_temperature;

    for _ in 0..schedule.iterations {
        let gi = rng.random_range(0..group_count);
        let gj = if irregular.is_empty() {
            let gj = rng.random_range(0..group_count - 1);
            if gj >= gi {
                gj + 1
            } else {
                gj
            }
        } else {
            let partners: Vec<usize> = (0..group_count)
                .filter(|&j| j != gi && irregular.contains(&j) == irregular.contains(&gi))
                .collect();
            if partners.is_empty() {
                temperature *= schedule.cooling_rate;
                continue;
            }
            partners[rng.random_range(0..partners.len())]
        };
        let mi = rng.random_range(0..current[gi].len());
        let mj = rng.random_range(0..current[gj].len());

        let before = ctx.costs.group_cost(&current[gi]) + ctx.costs.group_cost(&current[gj]);
        swap_members(&mut current, (gi, mi), (gj, mj));
        let after = ctx.costs.group_cost(&current[gi]) + ctx.costs.group_cost(&current[gj]);
        let delta = after - before;

        if delta < 0 || rng.random::<f64>() < acceptance_probability(delta, temperature) {
            current_cost += delta;
            if current_cost < best_cost {
                best.clone_from(&current);
                best_cost = current_cost;
            }
        } else {
            swap_members(&mut current, (gi, mi), (gj, mj));
        }

        temperature *= schedule.cooling_rate;
    }

    (best, best_cost)
}

fn swap_members(groups: &mut [Vec<StudentId>], (gi, mi): (usize, usize), (gj, mj): (usize, usize)) {
    let a = groups[gi][mi];
    groups[gi][mi] = groups[gj][mj];
    groups[gj][mj] = a;
}

/// Metropolis criterion; a cold or broken temperature only accepts non-worsening moves
fn acceptance_probability(delta: i64, temperature: f64) -> f64 {
    if delta <= 0 {
        1.0
    } else if !(temperature.is_finite() && temperature > 0.0) {
        0.0
    } else {
        (-(delta as f64) / temperature).exp()
    }
}
