//! Analysis of many method bodies at once
//!
//! A method that fails verification never stops the batch: every method is analysed and every
//! failure is collected.

use crate::analysis::{
    locate_argument_regions, partition_blocks, verify, ArgumentRegion, Error,
    InvalidMethodReport, Settings, StackMap,
};
use crate::cil::{FlowControl, InsnId, MethodBody, OpCode};
use log::warn;
use std::fmt;

/// Arguments of a call that couldn't be located
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentFailure {
    pub method: String,
    pub call: InsnId,
    pub error: Error,
}

impl fmt::Display for ArgumentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.method, self.call, self.error)
    }
}

/// Outcome of analysing a single method
#[derive(Debug)]
pub struct MethodAnalysis {
    pub stack_map: Result<StackMap, InvalidMethodReport>,

    /// Argument regions of every call whose arguments could be located
    pub call_arguments: Vec<(InsnId, Vec<ArgumentRegion>)>,

    pub argument_failures: Vec<ArgumentFailure>,
}

/// Outcome of analysing many methods
#[derive(Debug, Default)]
pub struct AnalysisReport {
    /// Number of methods that passed verification
    pub verified: usize,

    pub invalid_methods: Vec<InvalidMethodReport>,

    pub argument_failures: Vec<ArgumentFailure>,
}

impl AnalysisReport {
    /// Did every method pass verification?
    pub fn is_success(&self) -> bool {
        self.invalid_methods.is_empty()
    }
}

/// Verify a method, then locate the arguments of its calls (if enabled)
pub fn analyze_method(settings: &Settings, body: &MethodBody<'_>) -> MethodAnalysis {
    let stack_map = verify(body);
    let mut call_arguments = vec![];
    let mut argument_failures = vec![];

    if stack_map.is_ok() && settings.locate_call_arguments {
        let partition = if settings.require_same_block_arguments {
            Some(partition_blocks(body))
        } else {
            None
        };

        let calls = body.iter().filter(|(_, instruction)| {
            instruction.flow_control() == FlowControl::Call && instruction.opcode != OpCode::Jmp
        });
        for (call, _) in calls {
            let located = locate_argument_regions(body, call).and_then(|regions| {
                if let Some(partition) = &partition {
                    for region in &regions {
                        partition.ensure_same_block(region.start, call)?;
                    }
                }
                Ok(regions)
            });
            match located {
                Ok(regions) => call_arguments.push((call, regions)),
                Err(error) => {
                    warn!("{}: arguments of {} not located: {}", body.name, call, error);
                    argument_failures.push(ArgumentFailure {
                        method: body.name.clone(),
                        call,
                        error,
                    });
                }
            }
        }
    }

    MethodAnalysis {
        stack_map,
        call_arguments,
        argument_failures,
    }
}

/// Analyse every method, collecting all failures
pub fn analyze_methods<'a, 'g: 'a>(
    settings: &Settings,
    bodies: impl IntoIterator<Item = &'a MethodBody<'g>>,
) -> AnalysisReport {
    let mut report = AnalysisReport::default();
    for body in bodies {
        let analysis = analyze_method(settings, body);
        match analysis.stack_map {
            Ok(_) => report.verified += 1,
            Err(invalid) => {
                warn!("{}", invalid);
                report.invalid_methods.push(invalid);
            }
        }
        report.argument_failures.extend(analysis.argument_failures);
    }
    report
}

/// Verify every method, returning the reports of all of those that are invalid
pub fn verify_stack_consistency<'a, 'g: 'a>(
    bodies: impl IntoIterator<Item = &'a MethodBody<'g>>,
) -> Result<(), Vec<InvalidMethodReport>> {
    let invalid: Vec<InvalidMethodReport> = bodies
        .into_iter()
        .filter_map(|body| verify(body).err())
        .collect();
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(invalid)
    }
}
