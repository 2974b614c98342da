//! Single forward pass checking that the stack depth is consistent at every join point
//!
//! The pass relies on the property that every reachable program point of a well-formed body has
//! a unique, statically known stack depth. Walking instructions in program order, the depth
//! flowing out of each instruction is propagated to its fallthrough and to its branch targets.
//! Whenever a depth reaches a program point that already has one (from an earlier branch, an
//! exception region, or a previous visit for backward branches), the two must agree.

use crate::analysis::stack_effect::effect_in_body;
use crate::analysis::{InvalidMethodReport, InvalidStackKind, MalformedReason, StackEffect};
use crate::cil::{InsnId, MethodBody};
use log::{debug, trace};

/// How a stack state recorded at a program point reconciles with the state flowing into it
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StatePriority {
    /// Computed from normal control flow: incoming states must agree with it
    Normal,

    /// Flows out of an unconditional transfer, so doesn't describe a real path: any state
    /// recorded for the next instruction replaces it
    IgnoreIfForwardTarget,

    /// Dictated by an exception region: replaces whatever flows into it
    Forced,
}

/// Stack depth at a program point (right before an instruction executes)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StackState {
    pub depth: usize,
    pub priority: StatePriority,
}

impl StackState {
    pub const fn normal(depth: usize) -> StackState {
        StackState {
            depth,
            priority: StatePriority::Normal,
        }
    }

    pub const fn forced(depth: usize) -> StackState {
        StackState {
            depth,
            priority: StatePriority::Forced,
        }
    }

    /// State after an unconditional transfer of control
    pub const fn unreachable() -> StackState {
        StackState {
            depth: 0,
            priority: StatePriority::IgnoreIfForwardTarget,
        }
    }

    /// State at an instruction, given the state falling through into it (`self`) and the state
    /// previously recorded for it
    ///
    /// A forced state always wins, even over a state flowing out of an unconditional transfer.
    pub fn reconcile_fallthrough(
        self,
        recorded: StackState,
    ) -> Result<StackState, InvalidStackKind> {
        if recorded.priority == StatePriority::Forced
            || self.priority == StatePriority::IgnoreIfForwardTarget
        {
            Ok(recorded)
        } else if recorded.depth == self.depth {
            Ok(self)
        } else {
            Err(InvalidStackKind::DepthMismatch {
                recorded: recorded.depth,
                current: self.depth,
            })
        }
    }

    /// State to record at a branch target, given the state branching to it (`self`) and the
    /// state previously recorded for it, if any
    pub fn reconcile_branch(
        self,
        target: InsnId,
        recorded: Option<StackState>,
    ) -> Result<StackState, InvalidStackKind> {
        match recorded {
            None => Ok(StackState::normal(self.depth)),
            Some(recorded) if recorded.depth != self.depth => {
                Err(InvalidStackKind::BranchTargetMismatch {
                    target,
                    recorded: recorded.depth,
                    current: self.depth,
                })
            }
            Some(recorded) if recorded.priority == StatePriority::Forced => Ok(recorded),
            Some(_) => Ok(StackState::normal(self.depth)),
        }
    }
}

/// Stack depths of a verified body
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackMap {
    /// Depth before each instruction, or `None` for unreachable instructions
    pub depths: Vec<Option<usize>>,

    /// Maximum depth reached anywhere in the body
    pub max_stack: usize,
}

impl StackMap {
    pub fn depth_at(&self, id: InsnId) -> Option<usize> {
        self.depths.get(id.index()).copied().flatten()
    }
}

/// Verify that the stack depth of a body is consistent
pub fn verify(body: &MethodBody<'_>) -> Result<StackMap, InvalidMethodReport> {
    let result = verify_states(body);
    match &result {
        Ok(stack_map) => debug!(
            "{} is consistent (max stack {})",
            body.name, stack_map.max_stack
        ),
        Err(report) => debug!("{} is rejected: {}", body.name, report),
    }
    result
}

fn verify_states(body: &MethodBody<'_>) -> Result<StackMap, InvalidMethodReport> {
    let report = |instruction: InsnId, kind: InvalidStackKind| InvalidMethodReport {
        method: body.name.clone(),
        instruction,
        kind,
    };

    let mut states: Vec<Option<StackState>> = vec![None; body.len()];

    // Exception regions dictate the depth at their entry points
    for region in body.exception_regions() {
        for (entry, depth) in region.forced_entries() {
            if let Some(existing) = states[entry.index()] {
                if existing.depth != depth {
                    return Err(report(
                        entry,
                        InvalidStackKind::ConflictingRegionEntry {
                            forced: depth,
                            other: existing.depth,
                        },
                    ));
                }
            }
            states[entry.index()] = Some(StackState::forced(depth));
        }
    }

    let mut current = StackState::normal(0);
    let mut max_stack = 0;

    for (id, instruction) in body.iter() {
        if let Some(recorded) = states[id.index()] {
            current = current
                .reconcile_fallthrough(recorded)
                .map_err(|kind| report(id, kind))?;
        }
        states[id.index()] = Some(current);
        max_stack = max_stack.max(current.depth);
        trace!("{} {:<24} {:?}", id, instruction.to_string(), current);

        let effect = match effect_in_body(body, id) {
            Ok(effect) => effect,
            Err(MalformedReason::StackClearing) => StackEffect::new(current.depth, 0),
            Err(reason) => return Err(report(id, InvalidStackKind::Malformed(reason))),
        };
        let remaining = current.depth.checked_sub(effect.pop).ok_or_else(|| {
            report(
                id,
                InvalidStackKind::StackUnderflow {
                    depth: current.depth,
                    pops: effect.pop,
                },
            )
        })?;
        current = StackState::normal(remaining + effect.push);
        max_stack = max_stack.max(current.depth);

        for target in instruction.targets() {
            let recorded = &mut states[target.index()];
            *recorded = Some(
                current
                    .reconcile_branch(*target, *recorded)
                    .map_err(|kind| report(id, kind))?,
            );
        }

        if instruction.flow_control().is_unconditional_transfer() {
            current = StackState::unreachable();
        }
    }

    let depths = states
        .into_iter()
        .map(|state| {
            state
                .filter(|state| state.priority != StatePriority::IgnoreIfForwardTarget)
                .map(|state| state.depth)
        })
        .collect();
    Ok(StackMap { depths, max_stack })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cil::{parse_listing, Metadata, MetadataArenas};

    fn verify_listing(source: &str) -> Result<StackMap, InvalidMethodReport> {
        let arenas = MetadataArenas::new();
        let metadata = Metadata::new(&arenas);
        let listing = parse_listing(&metadata, source).unwrap();
        verify(&listing.methods[0])
    }

    #[test]
    fn fallthrough_reconciliation() {
        let normal = StackState::normal(2);
        let forced = StackState::forced(1);
        let unreachable = StackState::unreachable();

        assert_eq!(normal.reconcile_fallthrough(forced), Ok(forced));
        assert_eq!(unreachable.reconcile_fallthrough(forced), Ok(forced));
        assert_eq!(
            unreachable.reconcile_fallthrough(StackState::normal(3)),
            Ok(StackState::normal(3))
        );
        assert_eq!(normal.reconcile_fallthrough(StackState::normal(2)), Ok(normal));
        assert_eq!(
            normal.reconcile_fallthrough(StackState::normal(0)),
            Err(InvalidStackKind::DepthMismatch {
                recorded: 0,
                current: 2
            })
        );
    }

    #[test]
    fn branch_reconciliation() {
        let target = InsnId(7);
        let normal = StackState::normal(1);

        assert_eq!(normal.reconcile_branch(target, None), Ok(normal));
        assert_eq!(
            normal.reconcile_branch(target, Some(StackState::forced(1))),
            Ok(StackState::forced(1))
        );
        assert_eq!(
            normal.reconcile_branch(target, Some(StackState::unreachable())),
            Err(InvalidStackKind::BranchTargetMismatch {
                target,
                recorded: 0,
                current: 1
            })
        );
    }

    #[test]
    fn catch_handler_starts_with_the_exception() {
        let stack_map = verify_listing(
            r#"
            .method Test::Catch
            t:  ldc.i4 1
                pop
                leave out
            h:  pop
                leave out
            out:
                ret
            .try t h catch h out
            .end
            "#,
        )
        .unwrap();
        assert_eq!(stack_map.depth_at(InsnId(3)), Some(1));
        assert_eq!(stack_map.depth_at(InsnId(5)), Some(0));
        assert_eq!(stack_map.max_stack, 1);
    }

    #[test]
    fn filter_and_handler_both_start_with_the_exception() {
        let stack_map = verify_listing(
            r#"
            .method Test::Filter
            t:  leave out
            f:  pop
                ldc.i4 1
                endfilter
            h:  pop
                leave out
            out:
                ret
            .try t f filter f h out
            .end
            "#,
        )
        .unwrap();
        assert_eq!(stack_map.depth_at(InsnId(1)), Some(1));
        assert_eq!(stack_map.depth_at(InsnId(4)), Some(1));
    }

    #[test]
    fn finally_handler_starts_empty() {
        let stack_map = verify_listing(
            r#"
            .method Test::Finally
            t:  nop
                leave out
            h:  endfinally
            out:
                ret
            .try t h finally h out
            .end
            "#,
        )
        .unwrap();
        assert_eq!(stack_map.depth_at(InsnId(2)), Some(0));

        let result = verify_listing(
            r#"
            .method Test::FinallyPop
            t:  leave out
            h:  pop
                endfinally
            out:
                ret
            .try t h finally h out
            .end
            "#,
        );
        assert_eq!(
            result.err().map(|report| report.kind),
            Some(InvalidStackKind::StackUnderflow { depth: 0, pops: 1 })
        );
    }

    #[test]
    fn forced_state_wins_over_fallthrough() {
        // The protected block falls into the handler with an empty stack
        let stack_map = verify_listing(
            r#"
            .method Test::Forced
            t:  nop
            h:  pop
                leave out
            out:
                ret
            .try t h catch h out
            .end
            "#,
        )
        .unwrap();
        assert_eq!(stack_map.depth_at(InsnId(1)), Some(1));
    }

    #[test]
    fn mismatched_join_is_rejected() {
        let report = verify_listing(
            r#"
            .method Test::Join returns
                ldarg 0
                brtrue two
                ldc.i4 1
                br join
            two:
                ldc.i4 1
                ldc.i4 2
            join:
                ret
            .end
            "#,
        )
        .unwrap_err();
        assert_eq!(report.method, "Test::Join");
        assert_eq!(report.instruction, InsnId(6));
        assert_eq!(
            report.kind,
            InvalidStackKind::DepthMismatch {
                recorded: 1,
                current: 2
            }
        );
    }

    #[test]
    fn mismatched_branches_are_rejected() {
        let report = verify_listing(
            r#"
            .method Test::Branches
                ldarg 0
                brtrue join
                ldc.i4 1
                br join
            join:
                ret
            .end
            "#,
        )
        .unwrap_err();
        assert_eq!(report.instruction, InsnId(3));
        assert_eq!(
            report.kind,
            InvalidStackKind::BranchTargetMismatch {
                target: InsnId(4),
                recorded: 0,
                current: 1
            }
        );
    }

    #[test]
    fn backward_branches_are_checked() {
        let consistent = verify_listing(
            r#"
            .method Test::Loop
                ldc.i4 10
                stloc 0
            head:
                ldloc 0
                ldc.i4 1
                sub
                dup
                stloc 0
                brtrue head
                ret
            .end
            "#,
        );
        assert_eq!(consistent.map(|map| map.max_stack), Ok(2));

        let growing = verify_listing(
            r#"
            .method Test::Grow
            head:
                ldc.i4 1
                br head
            .end
            "#,
        );
        assert!(matches!(
            growing.map_err(|report| report.kind),
            Err(InvalidStackKind::BranchTargetMismatch { recorded: 0, current: 1, .. })
        ));
    }

    #[test]
    fn leave_empties_the_stack() {
        let stack_map = verify_listing(
            r#"
            .method Test::Leave
            t:  ldc.i4 1
                ldc.i4 2
                leave out
            h:  endfinally
            out:
                ret
            .try t h finally h out
            .end
            "#,
        )
        .unwrap();
        assert_eq!(stack_map.depth_at(InsnId(4)), Some(0));
        assert_eq!(stack_map.max_stack, 2);
    }

    #[test]
    fn unreachable_code_has_no_depth() {
        let stack_map = verify_listing(
            r#"
            .method Test::Dead
                ret
                ret
            .end
            "#,
        )
        .unwrap();
        assert_eq!(stack_map.depths, vec![Some(0), None]);
    }

    #[test]
    fn conflicting_regions_are_rejected() {
        let report = verify_listing(
            r#"
            .method Test::Conflict
            t:  leave out
            h:  pop
                leave out
            out:
                ret
            .try t h catch h out
            .try h out finally out end
            .end
            "#,
        )
        .unwrap_err();
        assert_eq!(report.instruction, InsnId(1));
        assert_eq!(
            report.kind,
            InvalidStackKind::ConflictingRegionEntry {
                forced: 0,
                other: 1
            }
        );
    }

    #[test]
    fn verification_is_idempotent() {
        let arenas = MetadataArenas::new();
        let metadata = Metadata::new(&arenas);
        let listing = parse_listing(
            &metadata,
            r#"
            .method Test::Ok
                ldc.i4 1
                pop
                ret
            .end
            .method Test::Bad
                pop
                ret
            .end
            "#,
        )
        .unwrap();

        for body in &listing.methods {
            assert_eq!(verify(body), verify(body));
        }
        assert!(verify(&listing.methods[0]).is_ok());
        assert!(verify(&listing.methods[1]).is_err());
    }
}
