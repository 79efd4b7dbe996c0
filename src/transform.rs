//! Code transform: source units to executable plans.
//!
//! Each [`UnitKind`] has one handler producing a [`Plan`], a list of steps
//! run through the unit's session.

use std::fmt;

use serde::Serialize;

use crate::error::{LoadResult, LoaderError};
use crate::parser;
use crate::session::Session;
use crate::template::TemplateMarkers;
use crate::unit::{Processor, SourceUnit, UnitKind};

/// A function invocation with text arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Call {
    pub function: String,
    pub args: Vec<String>,
}

/// One action against a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Fail with [`LoaderError::MissingExtension`] unless installed.
    RequireExtension { extension: String },
    /// Send SQL text.
    Execute { sql: String },
    Call { call: Call },
    /// Call only when the extension is installed; skip otherwise.
    CallIfExtension { extension: String, call: Call },
}

/// The executable form of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Canonical text recorded for audit (SQL units only).
    pub audit_text: Option<String>,
    pub steps: Vec<Step>,
}

/// Inputs the transform needs beyond the unit itself.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub markers: &'a TemplateMarkers,
    /// Filesystem handle handed to file processors.
    pub fs_handle: &'a str,
}

/// Trait for converting units to plans.
pub trait ToPlan {
    fn to_plan(&self, ctx: &TransformContext<'_>) -> LoadResult<Plan>;
}

impl ToPlan for SourceUnit {
    fn to_plan(&self, ctx: &TransformContext<'_>) -> LoadResult<Plan> {
        match self.kind() {
            Some(UnitKind::SqlQuery) => Ok(self.query_plan()),
            Some(UnitKind::SqlCommand) => Ok(self.command_plan()),
            Some(UnitKind::Language {
                language,
                extension,
                file_processor,
            }) => self.language_plan(ctx, language, extension, file_processor),
            Some(UnitKind::Tool { processor }) => Ok(self.tool_plan(processor)),
            None => Err(LoaderError::Config(format!(
                "{}: classification names neither a language nor a processor",
                self.path
            ))),
        }
    }
}

impl SourceUnit {
    /// Wrap the query so that its result shape does not matter. The raw text
    /// is kept since whitespace can be significant between literals; the
    /// closing parenthesis goes on its own line so a trailing comment cannot
    /// swallow it.
    fn query_plan(&self) -> Plan {
        Plan {
            steps: vec![Step::Execute {
                sql: format!("WITH cte AS ({}\n) SELECT true FROM cte", self.code),
            }],
            audit_text: Some(parser::normalize(&self.code)),
        }
    }

    fn command_plan(&self) -> Plan {
        Plan {
            audit_text: Some(parser::normalize(&self.code)),
            steps: vec![Step::Execute {
                sql: self.code.clone(),
            }],
        }
    }

    fn language_plan(
        &self,
        ctx: &TransformContext<'_>,
        language: &str,
        extension: Option<&str>,
        file_processor: Option<Processor<'_>>,
    ) -> LoadResult<Plan> {
        let mut steps = Vec::new();

        if let Some(extension) = extension {
            steps.push(Step::RequireExtension {
                extension: extension.to_string(),
            });
        }

        if let Some(processor) = file_processor {
            let call = Call {
                function: processor.function.to_string(),
                args: vec![
                    self.code.clone(),
                    self.path.clone(),
                    ctx.fs_handle.to_string(),
                ],
            };
            steps.push(match processor.extension {
                Some(extension) => Step::CallIfExtension {
                    extension: extension.to_string(),
                    call,
                },
                None => Step::Call { call },
            });
        }

        if let Some(head) = ctx.markers.extract(&self.code)? {
            steps.push(Step::Execute {
                sql: routine_definition(head, language, &self.code),
            });
        }

        Ok(Plan {
            audit_text: None,
            steps,
        })
    }

    fn tool_plan(&self, processor: Processor<'_>) -> Plan {
        let mut steps = Vec::new();
        if let Some(extension) = processor.extension {
            steps.push(Step::RequireExtension {
                extension: extension.to_string(),
            });
        }
        steps.push(Step::Call {
            call: Call {
                function: processor.function.to_string(),
                args: vec![self.code.clone()],
            },
        });
        Plan {
            audit_text: None,
            steps,
        }
    }
}

/// `<head> LANGUAGE <language> AS '<body>'` with quotes in the body doubled.
pub fn routine_definition(head: &str, language: &str, body: &str) -> String {
    format!(
        "{} LANGUAGE {} AS '{}'",
        head,
        language,
        body.replace('\'', "''")
    )
}

impl Plan {
    /// Run every step through `session`, stopping at the first failure.
    pub async fn apply<S: Session>(&self, session: &mut S) -> LoadResult<()> {
        for step in &self.steps {
            match step {
                Step::RequireExtension { extension } => {
                    if !session.has_extension(extension).await? {
                        return Err(LoaderError::MissingExtension(extension.clone()));
                    }
                }
                Step::Execute { sql } => session.execute(sql).await?,
                Step::Call { call } => session.call(&call.function, &call.args).await?,
                Step::CallIfExtension { extension, call } => {
                    if session.has_extension(extension).await? {
                        session.call(&call.function, &call.args).await?;
                    } else {
                        tracing::debug!(
                            "Skipping {}: extension {} not installed",
                            call.function,
                            extension
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::RequireExtension { extension } => write!(f, "require extension {}", extension),
            Step::Execute { sql } => write!(f, "execute {}", sql),
            Step::Call { call } => write!(f, "call {}({} args)", call.function, call.args.len()),
            Step::CallIfExtension { extension, call } => write!(
                f,
                "call {}({} args) if extension {} is installed",
                call.function,
                call.args.len(),
                extension
            ),
        }
    }
}
