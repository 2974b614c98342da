use stackweave::analysis::MethodAnalysis;
use stackweave::cil;
use std::io;

/// Ways loading a listing can go wrong
#[derive(Debug)]
pub enum CheckError {
    Io(io::Error),
    Listing(cil::Error),
}

impl From<io::Error> for CheckError {
    fn from(err: io::Error) -> CheckError {
        CheckError::Io(err)
    }
}

impl From<cil::Error> for CheckError {
    fn from(err: cil::Error) -> CheckError {
        CheckError::Listing(err)
    }
}

pub enum CheckOutcome {
    /// The method is consistent and every call's arguments were located
    Ok,

    /// The method is consistent, but the arguments of some calls couldn't be located
    Unlocated(String),

    /// The method failed stack verification
    Invalid(String),

    /// The listing couldn't be loaded
    Error(String),
}

impl From<CheckError> for CheckOutcome {
    fn from(err: CheckError) -> CheckOutcome {
        match err {
            CheckError::Io(io_err) => CheckOutcome::Error(format!("IO - {}", io_err)),
            CheckError::Listing(err) => CheckOutcome::Error(format!("Listing - {}", err)),
        }
    }
}

impl From<MethodAnalysis> for CheckOutcome {
    fn from(analysis: MethodAnalysis) -> CheckOutcome {
        if let Err(report) = analysis.stack_map {
            return CheckOutcome::Invalid(report.to_string());
        }
        if analysis.argument_failures.is_empty() {
            CheckOutcome::Ok
        } else {
            let failures: Vec<String> = analysis
                .argument_failures
                .iter()
                .map(|failure| failure.to_string())
                .collect();
            CheckOutcome::Unlocated(failures.join("\n"))
        }
    }
}
