//! Textual listings of method bodies
//!
//! ```text
//! // callees are declared before they are used
//! .signature System.Math::Max params=2 returns
//! .signature Sample::Log params=1 instance
//!
//! .method Sample::Run returns
//!         ldc.i4 1
//!         ldc.i4 2
//!         call System.Math::Max
//!   done: ret
//! .end
//! ```
//!
//! Directives:
//!
//!   - `.signature NAME params=N [instance] [explicit] [returns]` declares a callee, usable both
//!     from call-style instructions and as the standalone signature of `calli`
//!   - `.method NAME [returns]` opens a method body, closed by `.end`
//!   - `.try START END catch|finally|fault HANDLER_START HANDLER_END` and
//!     `.try START END filter FILTER_START HANDLER_START HANDLER_END` add an exception region
//!
//! Instructions are written `[label:] mnemonic [operand]`. The label `end` is reserved and refers
//! to the end of the body (only meaningful as the end of a range in `.try`).

use crate::cil::{
    CallSignature, CallingConvention, Error, HandlerKind, Label, Metadata, MethodBody,
    MethodBodyBuilder, MethodData, OpCode, Operand, OperandKind, RegionLabels,
};
use std::collections::HashMap;

/// Method bodies read from a listing, in order of appearance
pub struct Listing<'g> {
    pub methods: Vec<MethodBody<'g>>,
}

/// Parse a listing, registering its signatures in `metadata`
pub fn parse_listing<'g>(metadata: &'g Metadata<'g>, source: &str) -> Result<Listing<'g>, Error> {
    let mut parser = ListingParser {
        metadata,
        current: None,
        methods: vec![],
    };

    for (idx, raw_line) in source.lines().enumerate() {
        let line_number = idx + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        match line.strip_prefix('.') {
            Some(directive) => parser.directive(line_number, directive)?,
            None => parser.instruction(line_number, line)?,
        }
    }

    if let Some(method) = parser.current {
        return Err(Error::listing(
            method.start_line,
            format!("method `{}` is missing `.end`", method.name),
        ));
    }

    Ok(Listing {
        methods: parser.methods,
    })
}

struct ListingParser<'g> {
    metadata: &'g Metadata<'g>,

    /// Method currently open
    current: Option<MethodInProgress<'g>>,

    methods: Vec<MethodBody<'g>>,
}

struct MethodInProgress<'g> {
    name: String,
    start_line: usize,
    builder: MethodBodyBuilder<'g>,
    names: LabelNames,
}

impl<'g> MethodInProgress<'g> {
    fn label(&mut self, name: &str) -> Label {
        if name == "end" {
            return self.names.end_label;
        }
        if let Some(label) = self.names.labels.get(name) {
            return *label;
        }
        let label = self.builder.fresh_label();
        self.names.labels.insert(name.to_owned(), label);
        label
    }

    fn place_label(&mut self, line: usize, label: Label) -> Result<(), Error> {
        self.builder
            .place_label(label)
            .map_err(|err| Error::listing(line, self.names.describe(err)))
    }

    fn finish(mut self, line: usize) -> Result<MethodBody<'g>, Error> {
        let end_label = self.names.end_label;
        self.place_label(line, end_label)?;
        let names = self.names;
        self.builder
            .finish()
            .map_err(|err| Error::listing(line, names.describe(err)))
    }
}

/// Names given to labels in the listing
struct LabelNames {
    labels: HashMap<String, Label>,

    /// Placed after the last instruction when the method is closed
    end_label: Label,
}

impl LabelNames {
    fn name_of(&self, label: Label) -> String {
        if label == self.end_label {
            return String::from("end");
        }
        self.labels
            .iter()
            .find(|(_, l)| **l == label)
            .map_or_else(|| format!("{:?}", label), |(name, _)| name.clone())
    }

    /// Rephrase a builder error in terms of the label names used in the listing
    fn describe(&self, error: Error) -> String {
        match error {
            Error::UnplacedLabel(label) => {
                format!("label `{}` is never placed", self.name_of(label))
            }
            Error::DuplicateLabel(label) => {
                format!("label `{}` is placed twice", self.name_of(label))
            }
            Error::BranchToEnd { instruction, label } => format!(
                "{} branches to `{}`, past the last instruction",
                instruction,
                self.name_of(label)
            ),
            Error::RegionStartsAtEnd(label) => format!(
                "exception region starts at `{}`, past the last instruction",
                self.name_of(label)
            ),
            other => other.to_string(),
        }
    }
}

impl<'g> ListingParser<'g> {
    fn directive(&mut self, line: usize, directive: &str) -> Result<(), Error> {
        let mut words = directive.split_whitespace();
        match words.next() {
            Some("signature") => self.signature(line, words),
            Some("method") => {
                if let Some(open) = &self.current {
                    return Err(Error::listing(
                        line,
                        format!("method `{}` is still open", open.name),
                    ));
                }
                let name = words
                    .next()
                    .ok_or_else(|| Error::listing(line, "missing method name"))?;
                let returns_value = match words.next() {
                    None => false,
                    Some("returns") => true,
                    Some(other) => {
                        return Err(Error::listing(line, format!("unexpected `{}`", other)))
                    }
                };
                let mut builder = MethodBodyBuilder::new(name, returns_value);
                let end_label = builder.fresh_label();
                self.current = Some(MethodInProgress {
                    name: name.to_owned(),
                    start_line: line,
                    builder,
                    names: LabelNames {
                        labels: HashMap::new(),
                        end_label,
                    },
                });
                Ok(())
            }
            Some("try") => {
                let method = self.open_method(line)?;
                let words: Vec<&str> = words.collect();
                let region = match words.as_slice() {
                    [try_start, try_end, "filter", filter_start, handler_start, handler_end] => {
                        RegionLabels {
                            try_start: method.label(try_start),
                            try_end: method.label(try_end),
                            kind: HandlerKind::Filter,
                            filter_start: Some(method.label(filter_start)),
                            handler_start: method.label(handler_start),
                            handler_end: method.label(handler_end),
                        }
                    }
                    [try_start, try_end, kind, handler_start, handler_end] => {
                        let kind = match *kind {
                            "catch" => HandlerKind::Catch,
                            "finally" => HandlerKind::Finally,
                            "fault" => HandlerKind::Fault,
                            other => {
                                return Err(Error::listing(
                                    line,
                                    format!("unknown handler kind `{}`", other),
                                ))
                            }
                        };
                        RegionLabels {
                            try_start: method.label(try_start),
                            try_end: method.label(try_end),
                            kind,
                            filter_start: None,
                            handler_start: method.label(handler_start),
                            handler_end: method.label(handler_end),
                        }
                    }
                    _ => return Err(Error::listing(line, "malformed `.try`")),
                };
                method.builder.add_region(region);
                Ok(())
            }
            Some("end") => {
                let method = self
                    .current
                    .take()
                    .ok_or_else(|| Error::listing(line, "`.end` without `.method`"))?;
                self.methods.push(method.finish(line)?);
                Ok(())
            }
            Some(other) => Err(Error::listing(
                line,
                format!("unknown directive `.{}`", other),
            )),
            None => Err(Error::listing(line, "empty directive")),
        }
    }

    fn signature<'a>(
        &mut self,
        line: usize,
        mut words: impl Iterator<Item = &'a str>,
    ) -> Result<(), Error> {
        let name = words
            .next()
            .ok_or_else(|| Error::listing(line, "missing signature name"))?;
        let mut parameter_count = None;
        let mut calling_convention = CallingConvention::empty();
        let mut returns_value = false;
        for word in words {
            match word {
                "instance" => calling_convention |= CallingConvention::HAS_THIS,
                "explicit" => {
                    calling_convention |=
                        CallingConvention::HAS_THIS | CallingConvention::EXPLICIT_THIS
                }
                "returns" => returns_value = true,
                _ => match word.strip_prefix("params=") {
                    Some(count) => {
                        parameter_count = Some(count.parse::<usize>().map_err(|_| {
                            Error::listing(line, format!("invalid parameter count `{}`", count))
                        })?)
                    }
                    None => return Err(Error::listing(line, format!("unexpected `{}`", word))),
                },
            }
        }
        let signature = CallSignature {
            parameter_count: parameter_count
                .ok_or_else(|| Error::listing(line, "missing `params=`"))?,
            calling_convention,
            returns_value,
        };

        let in_line = |err: Error| Error::listing(line, err.to_string());
        self.metadata
            .add_method(MethodData {
                name: name.to_owned(),
                signature: signature.clone(),
            })
            .map_err(in_line)?;
        self.metadata
            .add_signature(name.to_owned(), signature)
            .map_err(in_line)?;
        Ok(())
    }

    fn open_method(&mut self, line: usize) -> Result<&mut MethodInProgress<'g>, Error> {
        self.current
            .as_mut()
            .ok_or_else(|| Error::listing(line, "instruction outside of `.method`"))
    }

    fn instruction(&mut self, line: usize, text: &str) -> Result<(), Error> {
        let metadata = self.metadata;
        let method = self.open_method(line)?;

        // Optional leading label
        let (label, text) = match text.split_once(char::is_whitespace) {
            Some((first, rest)) if first.ends_with(':') => (Some(first), rest.trim()),
            None if text.ends_with(':') => (Some(text), ""),
            _ => (None, text),
        };
        if let Some(label) = label {
            let label = method.label(label.trim_end_matches(':'));
            method.place_label(line, label)?;
        }
        if text.is_empty() {
            return Ok(());
        }

        let (mnemonic, operand) = match text.split_once(char::is_whitespace) {
            Some((mnemonic, operand)) => (mnemonic, operand.trim()),
            None => (text, ""),
        };
        let opcode = OpCode::from_name(mnemonic)
            .ok_or_else(|| Error::listing(line, format!("unknown opcode `{}`", mnemonic)))?;

        let expect_operand = |what: &str| -> Result<(), Error> {
            if operand.is_empty() {
                Err(Error::listing(line, format!("`{}` expects {}", mnemonic, what)))
            } else {
                Ok(())
            }
        };
        let invalid = |what: &str| {
            Error::listing(
                line,
                format!("invalid {} `{}` for `{}`", what, operand, mnemonic),
            )
        };

        let operand = match opcode.info().operand {
            OperandKind::None => {
                if !operand.is_empty() {
                    return Err(Error::listing(
                        line,
                        format!("`{}` takes no operand", mnemonic),
                    ));
                }
                Operand::None
            }
            OperandKind::Int => {
                expect_operand("an integer")?;
                Operand::Int(parse_int(operand).ok_or_else(|| invalid("integer"))?)
            }
            OperandKind::Float => {
                expect_operand("a float")?;
                Operand::Float(operand.parse::<f64>().map_err(|_| invalid("float"))?)
            }
            OperandKind::String => {
                let literal = operand
                    .strip_prefix('"')
                    .and_then(|rest| rest.strip_suffix('"'))
                    .ok_or_else(|| invalid("string"))?;
                Operand::String(literal.replace("\\\"", "\"").replace("\\\\", "\\"))
            }
            OperandKind::Variable => {
                expect_operand("a variable index")?;
                Operand::Variable(operand.parse::<u16>().map_err(|_| invalid("variable"))?)
            }
            OperandKind::Target => {
                expect_operand("a label")?;
                let target = method.label(operand);
                method.builder.push_branch(opcode, target);
                return Ok(());
            }
            OperandKind::Targets => {
                let targets = operand
                    .strip_prefix('(')
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| invalid("jump table"))?;
                let targets: Vec<Label> = targets
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(|name| method.label(name))
                    .collect();
                method.builder.push_switch(targets);
                return Ok(());
            }
            OperandKind::Method => {
                expect_operand("a method")?;
                Operand::Method(metadata.lookup_method(operand).ok_or_else(|| {
                    Error::listing(line, format!("unknown method `{}`", operand))
                })?)
            }
            OperandKind::Signature => {
                expect_operand("a signature")?;
                Operand::Signature(metadata.lookup_signature(operand).ok_or_else(|| {
                    Error::listing(line, format!("unknown signature `{}`", operand))
                })?)
            }
            OperandKind::Token => {
                expect_operand("a token")?;
                Operand::Token(operand.to_owned())
            }
        };
        method.builder.push(opcode, operand);
        Ok(())
    }
}

fn parse_int(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = match digits.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// Drop a trailing `//` comment (outside of string literals)
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    let mut previous_slash = false;
    for (idx, c) in line.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => (),
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '/' if previous_slash => return &line[..idx - 1],
            _ => (),
        }
        previous_slash = c == '/';
    }
    line
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cil::{InsnId, MetadataArenas};

    #[test]
    fn comments() {
        assert_eq!(strip_comment("ldc.i4 1 // one"), "ldc.i4 1 ");
        assert_eq!(strip_comment("ldstr \"a // b\""), "ldstr \"a // b\"");
        assert_eq!(strip_comment("// only"), "");
    }

    #[test]
    fn integers() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("-7"), Some(-7));
        assert_eq!(parse_int("0x10"), Some(16));
        assert_eq!(parse_int("ten"), None);
    }

    #[test]
    fn full_listing() {
        let arenas = MetadataArenas::new();
        let metadata = Metadata::new(&arenas);
        let listing = parse_listing(
            &metadata,
            r#"
            .signature Sample::Log params=1 instance
            .signature Sample::Make params=2 returns

            .method Sample::Run returns
              start:  ldarg 0
                      ldstr "hi // there"
                      callvirt Sample::Log
                      ldc.i4 0x2
                      switch (start, done)
              done:
                      ldc.i4 1
                      ldc.i4 2
                      call Sample::Make
                      ret
              .try start done finally done end
            .end
            "#,
        )
        .unwrap();

        assert_eq!(listing.methods.len(), 1);
        let body = &listing.methods[0];
        assert!(body.returns_value);
        assert_eq!(body.len(), 9);
        assert_eq!(
            body[InsnId(4)].operand,
            Operand::Targets(vec![InsnId(0), InsnId(5)])
        );
        assert_eq!(body[InsnId(1)].operand, Operand::String(String::from("hi // there")));

        let region = &body.exception_regions()[0];
        assert_eq!(region.try_start, InsnId(0));
        assert_eq!(region.handler_start, InsnId(5));
        assert_eq!(region.handler_end, None);

        let log = metadata.lookup_method("Sample::Log").unwrap();
        assert!(log.signature.has_implicit_receiver());
    }

    #[test]
    fn errors_carry_line_numbers() {
        let arenas = MetadataArenas::new();
        let metadata = Metadata::new(&arenas);

        let unknown_opcode = parse_listing(&metadata, ".method A\n  frobnicate\n.end");
        assert!(matches!(unknown_opcode, Err(Error::Listing { line: 2, .. })));

        let unknown_method = parse_listing(&metadata, ".method A\n  call Nope::Nope\n.end");
        assert!(matches!(unknown_method, Err(Error::Listing { line: 2, .. })));

        let unplaced = parse_listing(&metadata, ".method A\n  br nowhere\n.end\n");
        match unplaced {
            Err(Error::Listing { line, message }) => {
                assert_eq!(line, 3);
                assert_eq!(message, "label `nowhere` is never placed");
            }
            _ => panic!("expected a listing error"),
        }

        let unclosed = parse_listing(&metadata, "\n.method A\n  ret\n");
        assert!(matches!(unclosed, Err(Error::Listing { line: 2, .. })));
    }
}
