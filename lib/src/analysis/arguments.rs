//! Backward location of the instructions producing the arguments of a call

use crate::analysis::{compute_arity, stack_effect_in, Error};
use crate::cil::{FlowControl, InsnId, MethodBody, OpCode};
use log::trace;

/// Contiguous run of instructions that, taken together, push exactly one argument of a call
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArgumentRegion {
    /// First instruction of the run
    pub start: InsnId,

    /// Instruction whose push is the argument
    pub producer: InsnId,

    /// Last instruction of the run
    pub end: InsnId,
}

/// Producers of each argument of a call, in argument order
///
/// The last element produces the argument pushed last (right before the call).
pub fn locate_arguments(body: &MethodBody<'_>, call: InsnId) -> Result<Vec<InsnId>, Error> {
    Ok(locate_argument_regions(body, call)?
        .into_iter()
        .map(|region| region.producer)
        .collect())
}

/// Like [`locate_arguments`], but also returns the full extent of each argument
pub fn locate_argument_regions(
    body: &MethodBody<'_>,
    call: InsnId,
) -> Result<Vec<ArgumentRegion>, Error> {
    let arity = compute_arity(body, call)?;

    // Slots are resolved from the last one (nearest to the call) backwards
    let mut regions = Vec::with_capacity(arity.pop);
    let mut cursor = body.previous(call);
    for slot in (0..arity.pop).rev() {
        let (region, next_cursor) = scan_argument(body, call, cursor)?;
        trace!(
            "argument {} of {} is produced by {} ({}..={})",
            slot,
            call,
            region.producer,
            region.start,
            region.end
        );
        regions.push(region);
        cursor = next_cursor;
    }
    regions.reverse();
    Ok(regions)
}

/// Scan backwards from `cursor` for the instructions producing one stack slot
///
/// Returns the region found along with the cursor from which to scan for the preceding slot.
fn scan_argument(
    body: &MethodBody<'_>,
    call: InsnId,
    cursor: Option<InsnId>,
) -> Result<(ArgumentRegion, Option<InsnId>), Error> {
    let end = cursor.ok_or(Error::ArgumentNotFound { call })?;

    let mut stack_to_consume: usize = 1;
    let mut producer: Option<InsnId> = None;
    let mut cursor = Some(end);

    while let Some(id) = cursor {
        let instruction = &body[id];
        if instruction.flow_control().ends_block() || instruction.opcode == OpCode::Jmp {
            return Err(Error::ArgumentLocationAmbiguous(id));
        }
        debug_assert!(matches!(
            instruction.flow_control(),
            FlowControl::Next | FlowControl::Call
        ));

        let effect = stack_effect_in(body, id)?;
        stack_to_consume = stack_to_consume
            .checked_sub(effect.push)
            .ok_or(Error::UnbalancedStack(id))?;
        if stack_to_consume == 0 && producer.is_none() {
            producer = Some(id);
        }
        stack_to_consume += effect.pop;

        if let (0, Some(producer)) = (stack_to_consume, producer) {
            let region = ArgumentRegion {
                start: id,
                producer,
                end,
            };
            return Ok((region, body.previous(id)));
        }
        cursor = body.previous(id);
    }

    Err(Error::ArgumentNotFound { call })
}
