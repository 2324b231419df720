//! Per-pack planning: rule matching, grouping by handler, action generation.
use crate::error::Result;
use crate::fs::Fs;
use crate::handlers::{HandlerContext, HandlerEntry, HandlerRegistry};
use crate::rules::{Match, Rule, RuleSet, match_pack};
use crate::types::{Action, CommandIntent, Pack, Planned, Refusal};

/// Matches claimed by one handler within a pack.
#[derive(Debug, Clone)]
pub struct HandlerGroup {
    /// Registry entry of the handler.
    pub entry: HandlerEntry,
    /// Matches in discovery order.
    pub matches: Vec<Match>,
}

impl HandlerGroup {
    /// Pack-relative file names of the matches.
    #[must_use]
    pub fn files(&self) -> Vec<String> {
        self.matches
            .iter()
            .map(|m| crate::types::display_relative(&m.relative))
            .collect()
    }
}

/// What a handler planned for its matches.
#[derive(Debug, Clone)]
pub struct HandlerPlan {
    /// The handler's matches.
    pub group: HandlerGroup,
    /// One outcome per match, in match order.
    pub actions: Vec<Planned>,
}


/// Everything planned for one pack.
#[derive(Debug, Clone)]
pub struct PackPlan {
    /// The pack.
    pub pack: Pack,
    /// One entry per handler with matches, in registry precedence order.
    pub handlers: Vec<HandlerPlan>,
}

impl PackPlan {
    /// All generated actions in execution order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.handlers
            .iter()
            .flat_map(|h| h.actions.iter())
            .filter_map(|p| p.as_ref().ok())
    }
}

/// Apply the pack's rules and group the matches by handler.
///
/// Only handlers whose run mode takes part in `intent` are returned, in
/// registry order. A handler that takes part but has no matches is included
/// only when `keep_empty` is set, which clearing needs to find stale state.
///
/// # Errors
///
/// Returns a rule error for malformed patterns or unknown handlers, or a
/// filesystem error if the pack cannot be listed.
pub fn group_matches(
    fs: &dyn Fs,
    registry: &HandlerRegistry,
    defaults: &[Rule],
    root_rules: &[Rule],
    pack: &Pack,
    intent: CommandIntent,
    keep_empty: bool,
) -> Result<Vec<HandlerGroup>> {
    let rules = RuleSet::for_pack(
        defaults,
        root_rules,
        &pack.config.rules,
        &pack.config.ignore,
        |name| registry.contains(name),
    )?;
    let mut matches = match_pack(fs, pack, &rules)?;

    let mut groups = Vec::new();
    for entry in registry.entries() {
        if !intent.includes(entry.run_mode) {
            continue;
        }
        let (mine, rest): (Vec<_>, Vec<_>) =
            matches.into_iter().partition(|m| m.handler == entry.name);
        matches = rest;
        if mine.is_empty() && !keep_empty {
            continue;
        }
        groups.push(HandlerGroup {
            entry: *entry,
            matches: mine,
        });
    }
    Ok(groups)
}

/// Plan every match of each group, keeping only handlers that run in the
/// intent's category.
///
/// A refused match becomes a [`Refusal`] in its place; the handler's other
/// matches are still planned.
#[must_use]
pub fn plan_actions(
    ctx: &HandlerContext<'_>,
    groups: Vec<HandlerGroup>,
    intent: CommandIntent,
) -> Vec<HandlerPlan> {
    groups
        .into_iter()
        .map(|group| {
            let handler = group.entry.create();
            let actions = if intent.includes(handler.run_mode()) {
                group
                    .matches
                    .iter()
                    .map(|m| {
                        handler
                            .to_action(ctx, m)
                            .map_err(|e| Refusal::new(&m.pack, handler.name(), &m.relative, &e))
                    })
                    .collect()
            } else {
                Vec::new()
            };
            HandlerPlan { group, actions }
        })
        .collect()
}
