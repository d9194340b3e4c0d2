//! Identity matching rule chains.
//!
//! Given normalized keys and a candidate pool (usually the result of a
//! narrow store query), decide whether the incoming record matches nothing,
//! exactly one entity, or several. Rules run in priority order and the first
//! rule that yields any candidate wins; rules are never AND-ed across levels
//! and there is no fuzzy fallback.
//!
//! Candidates are abstracted behind small identity traits so this module
//! stays independent of the storage models.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::disambiguate::suffix_of;
use crate::site_names::site_match_key;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Identity traits
// ---------------------------------------------------------------------------

/// Anything with a canonical store id.
pub trait Identified {
    fn id(&self) -> DbId;
}

pub trait SiteIdentity: Identified {
    fn site_name(&self) -> &str;
}

pub trait ModelIdentity: Identified {
    fn model_no(&self) -> &str;
}

pub trait ProjectorIdentity: Identified {
    fn serial_number(&self) -> &str;
}

pub trait AudiIdentity: Identified {
    fn site_id(&self) -> DbId;
    fn audi_no(&self) -> &str;
    fn projector_id(&self) -> Option<DbId>;
}

pub trait CaseIdentity: Identified {
    fn call_log_number(&self) -> Option<&str>;
    fn rma_number(&self) -> Option<&str>;

    fn case_key(&self, field: CaseKeyField) -> Option<&str> {
        match field {
            CaseKeyField::CallLogNumber => self.call_log_number(),
            CaseKeyField::RmaNumber => self.rma_number(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Outcome of a rule chain.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult<T> {
    None,
    Unique(T),
    /// More than one live candidate, or keys that point at conflicting
    /// records. Never resolved by picking one.
    Ambiguous(Vec<T>),
}

impl<T> MatchResult<T> {
    /// Classify the candidates a single rule produced.
    pub fn from_candidates(mut candidates: Vec<T>) -> Self {
        match candidates.len() {
            0 => Self::None,
            1 => Self::Unique(candidates.remove(0)),
            _ => Self::Ambiguous(candidates),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn unique(self) -> Option<T> {
        match self {
            Self::Unique(t) => Some(t),
            _ => None,
        }
    }
}

impl<T: Identified> MatchResult<T> {
    /// Ids of all candidates involved, for diagnostics.
    pub fn candidate_ids(&self) -> Vec<DbId> {
        match self {
            Self::None => Vec::new(),
            Self::Unique(t) => vec![t.id()],
            Self::Ambiguous(ts) => ts.iter().map(Identified::id).collect(),
        }
    }
}

/// A single prioritized rule: a name for diagnostics plus a predicate.
pub struct MatchRule<'a, T> {
    pub name: &'static str,
    pub predicate: Box<dyn Fn(&T) -> bool + 'a>,
}

impl<'a, T> MatchRule<'a, T> {
    pub fn new(name: &'static str, predicate: impl Fn(&T) -> bool + 'a) -> Self {
        Self {
            name,
            predicate: Box::new(predicate),
        }
    }
}

/// Run rules in order; the first rule with any hit decides the result.
///
/// Returns the decisive rule's name alongside the result (`None` when no
/// rule matched).
pub fn run_rule_chain<T: Clone>(
    rules: &[MatchRule<'_, T>],
    pool: &[T],
) -> (MatchResult<T>, Option<&'static str>) {
    for rule in rules {
        let hits: Vec<T> = pool.iter().filter(|c| (rule.predicate)(*c)).cloned().collect();
        if !hits.is_empty() {
            return (MatchResult::from_candidates(hits), Some(rule.name));
        }
    }
    (MatchResult::None, None)
}

// ---------------------------------------------------------------------------
// Master data
// ---------------------------------------------------------------------------

/// Sites match on their case-insensitive, whitespace-collapsed name.
pub fn match_site<S: SiteIdentity + Clone>(name: &str, pool: &[S]) -> MatchResult<S> {
    let key = site_match_key(name);
    let rules = [MatchRule::new("site_name", |s: &S| {
        site_match_key(s.site_name()) == key
    })];
    run_rule_chain(&rules, pool).0
}

/// Projector models match on `model_no` alone.
pub fn match_projector_model<M: ModelIdentity + Clone>(
    model_no: &str,
    pool: &[M],
) -> MatchResult<M> {
    let rules = [MatchRule::new("model_no", |m: &M| {
        m.model_no().eq_ignore_ascii_case(model_no)
    })];
    run_rule_chain(&rules, pool).0
}

/// Projectors match on the globally unique serial number alone.
pub fn match_projector<P: ProjectorIdentity + Clone>(serial: &str, pool: &[P]) -> MatchResult<P> {
    let rules = [MatchRule::new("serial_number", |p: &P| {
        p.serial_number().eq_ignore_ascii_case(serial)
    })];
    run_rule_chain(&rules, pool).0
}

/// Keys identifying an audi within a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudiKeys {
    pub site_id: DbId,
    pub audi_no: String,
    /// The projector the row says is installed, if already resolved.
    pub projector_id: Option<DbId>,
}

/// Audis match on `(site, audi_no, projector)` first, then `(site, audi_no)`.
///
/// The second rule is what lets the Reconciler find an audi whose
/// projector link is stale and correct it in place.
pub fn match_audi<A: AudiIdentity + Clone>(keys: &AudiKeys, pool: &[A]) -> MatchResult<A> {
    let same_slot =
        |a: &A| a.site_id() == keys.site_id && a.audi_no().eq_ignore_ascii_case(&keys.audi_no);

    let mut rules = Vec::with_capacity(2);
    if let Some(projector_id) = keys.projector_id {
        rules.push(MatchRule::new("site_audi_projector", move |a: &A| {
            same_slot(a) && a.projector_id() == Some(projector_id)
        }));
    }
    rules.push(MatchRule::new("site_audi", same_slot));
    run_rule_chain(&rules, pool).0
}

// ---------------------------------------------------------------------------
// Cases
// ---------------------------------------------------------------------------

/// The two natural-key fields a case can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKeyField {
    CallLogNumber,
    RmaNumber,
}

impl CaseKeyField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CallLogNumber => "call_log_number",
            Self::RmaNumber => "rma_number",
        }
    }
}

impl std::fmt::Display for CaseKeyField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized natural keys of an incoming case row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseKeys {
    pub call_log_number: Option<String>,
    pub rma_number: Option<String>,
}

impl CaseKeys {
    /// The strongest available key: call log if present, RMA otherwise.
    pub fn primary(&self) -> Option<(CaseKeyField, &str)> {
        match (&self.call_log_number, &self.rma_number) {
            (Some(c), _) => Some((CaseKeyField::CallLogNumber, c.as_str())),
            (None, Some(r)) => Some((CaseKeyField::RmaNumber, r.as_str())),
            (None, None) => None,
        }
    }

    /// The RMA number when the call log is the primary key.
    pub fn secondary(&self) -> Option<(CaseKeyField, &str)> {
        match (&self.call_log_number, &self.rma_number) {
            (Some(_), Some(r)) => Some((CaseKeyField::RmaNumber, r.as_str())),
            _ => None,
        }
    }

    pub fn get(&self, field: CaseKeyField) -> Option<&str> {
        match field {
            CaseKeyField::CallLogNumber => self.call_log_number.as_deref(),
            CaseKeyField::RmaNumber => self.rma_number.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primary().is_none()
    }
}

/// Match an incoming case against existing cases.
///
/// Keys are compared by *family*: the bare key and its disambiguated
/// variants (`K`, `K-1`, ...). Candidates already claimed by an earlier row
/// of the same run are invisible, so the n-th occurrence of a key in a run
/// lands on the n-th family member. That is what makes replaying a batch
/// idempotent while still keeping colliding rows apart.
///
/// 1. Primary key family: the lowest unclaimed variant that exists.
/// 2. Only if rule 1 found nothing and a secondary key is present: the
///    secondary key family.
///
/// A single hit whose *other* key is set and outside the row's family for
/// that key is reported as [`MatchResult::Ambiguous`]: both keys exist but
/// disagree, and guessing which one is right would risk a silent overwrite.
pub fn match_case<C: CaseIdentity + Clone>(
    keys: &CaseKeys,
    pool: &[C],
    claimed: &HashSet<DbId>,
) -> MatchResult<C> {
    let Some((primary_field, primary_key)) = keys.primary() else {
        return MatchResult::None;
    };
    let live: Vec<&C> = pool.iter().filter(|c| !claimed.contains(&c.id())).collect();

    let hits = lowest_family_variant(&live, primary_field, primary_key);
    if !hits.is_empty() {
        return check_other_key(hits, keys.secondary());
    }

    if let Some((secondary_field, secondary_key)) = keys.secondary() {
        let hits = lowest_family_variant(&live, secondary_field, secondary_key);
        if !hits.is_empty() {
            return check_other_key(hits, Some((primary_field, primary_key)));
        }
    }

    MatchResult::None
}

/// All live candidates holding the lowest existing variant of `base`.
fn lowest_family_variant<C: CaseIdentity + Clone>(
    live: &[&C],
    field: CaseKeyField,
    base: &str,
) -> Vec<C> {
    let ranked: Vec<(u32, &C)> = live
        .iter()
        .filter_map(|c| c.case_key(field).and_then(|v| suffix_of(v, base)).map(|n| (n, *c)))
        .collect();
    let Some(lowest) = ranked.iter().map(|(n, _)| *n).min() else {
        return Vec::new();
    };
    ranked
        .into_iter()
        .filter(|(n, _)| *n == lowest)
        .map(|(_, c)| c.clone())
        .collect()
}

fn check_other_key<C: CaseIdentity + Clone>(
    hits: Vec<C>,
    other: Option<(CaseKeyField, &str)>,
) -> MatchResult<C> {
    if hits.len() > 1 {
        return MatchResult::Ambiguous(hits);
    }
    if let Some((field, base)) = other {
        let disagrees = hits[0]
            .case_key(field)
            .is_some_and(|existing| suffix_of(existing, base).is_none());
        if disagrees {
            return MatchResult::Ambiguous(hits);
        }
    }
    MatchResult::from_candidates(hits)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
