//! Declarative calculation dialect (`server.toml`)
//!
//! A calculation question declares its randomized parameters, how each true
//! answer field derives from them, and how submitted fields are compared:
//!
//! ```toml
//! [params.ux]
//! type = "int"
//! min = -10
//! max = 10
//!
//! [answers.wx]
//! op = "sum"
//! of = ["ux", "vx"]
//!
//! [grading]
//! rtol = 0.01
//! exact = ["key"]
//! ```
//!
//! Parameters are drawn in name order from an RNG seeded with a BLAKE3 digest
//! of the variant seed, so one seed always yields one variant.

use crate::error::ModuleFault;
use crate::model::{GradedSubmission, RenderSelection, RenderedQuestion, Variant};
use crate::module::comparator::{as_number, AnswerComparator, ExactComparator, NumericComparator};
use crate::module::{GeneratedData, GradeOutcome, ModuleDialect, QuestionModule};
use crate::sandbox::ExecutionContext;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub const CALCULATION_ENTRY_FILE: &str = "server.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CalculationSpec {
    #[serde(default)]
    params: BTreeMap<String, ParamSpec>,
    #[serde(default)]
    answers: BTreeMap<String, AnswerSpec>,
    #[serde(default)]
    grading: GradingSpec,
    #[serde(default)]
    options: Option<Value>,
    #[serde(default)]
    render: Option<RenderSpec>,
    /// Served file name → alias path (e.g. `clientFilesCourse/data.csv`)
    #[serde(default)]
    files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ParamSpec {
    Int {
        min: i64,
        max: i64,
    },
    Float {
        min: f64,
        max: f64,
        #[serde(default)]
        digits: Option<u32>,
    },
    Choice {
        values: Vec<Value>,
    },
    Const {
        value: Value,
    },
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum AnswerOp {
    Param,
    Sum,
    Difference,
    Product,
    Quotient,
    Const,
}

#[derive(Debug, Clone, Deserialize)]
struct AnswerSpec {
    op: AnswerOp,
    #[serde(default)]
    of: Vec<String>,
    #[serde(default)]
    value: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GradingSpec {
    #[serde(default)]
    rtol: Option<f64>,
    #[serde(default)]
    atol: Option<f64>,
    /// Fields compared exactly even when numeric
    #[serde(default)]
    exact: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RenderSpec {
    #[serde(default)]
    headers: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    submission: String,
    #[serde(default)]
    answer: String,
}

impl ParamSpec {
    fn validate(&self, name: &str) -> Result<(), ModuleFault> {
        let bad = |msg: &str| Err(ModuleFault::new(format!("param {}: {}", name, msg)));
        match self {
            ParamSpec::Int { min, max } if min > max => bad("min exceeds max"),
            ParamSpec::Float { min, max, .. } if !min.is_finite() || !max.is_finite() => {
                bad("bounds must be finite")
            }
            ParamSpec::Float { min, max, .. } if min > max => bad("min exceeds max"),
            ParamSpec::Choice { values } if values.is_empty() => bad("no values to choose from"),
            _ => Ok(()),
        }
    }

    fn sample(&self, rng: &mut StdRng) -> Value {
        match self {
            ParamSpec::Int { min, max } => Value::from(rng.gen_range(*min..=*max)),
            ParamSpec::Float { min, max, digits } => {
                let raw = if min == max { *min } else { rng.gen_range(*min..=*max) };
                let value = match digits {
                    Some(d) => {
                        let scale = 10f64.powi(*d as i32);
                        (raw * scale).round() / scale
                    }
                    None => raw,
                };
                Value::from(value)
            }
            ParamSpec::Choice { values } => values[rng.gen_range(0..values.len())].clone(),
            ParamSpec::Const { value } => value.clone(),
        }
    }
}

impl AnswerSpec {
    fn validate(&self, name: &str, params: &BTreeMap<String, ParamSpec>) -> Result<(), ModuleFault> {
        let arity_ok = match self.op {
            AnswerOp::Param => self.of.len() == 1,
            AnswerOp::Sum | AnswerOp::Product => !self.of.is_empty(),
            AnswerOp::Difference | AnswerOp::Quotient => self.of.len() >= 2,
            AnswerOp::Const => self.value.is_some(),
        };
        if !arity_ok {
            return Err(ModuleFault::new(format!(
                "answer {}: wrong number of operands for {:?}",
                name, self.op
            )));
        }
        if let Some(missing) = self.of.iter().find(|p| !params.contains_key(*p)) {
            return Err(ModuleFault::new(format!(
                "answer {}: unknown param {}",
                name, missing
            )));
        }
        Ok(())
    }

    fn evaluate(&self, name: &str, params: &Map<String, Value>) -> Result<Value, ModuleFault> {
        match self.op {
            AnswerOp::Const => return Ok(self.value.clone().unwrap_or(Value::Null)),
            AnswerOp::Param => return Ok(params.get(&self.of[0]).cloned().unwrap_or(Value::Null)),
            _ => {}
        }

        let operands = self
            .of
            .iter()
            .map(|p| params.get(p).unwrap_or(&Value::Null))
            .collect::<Vec<_>>();

        if self.op != AnswerOp::Quotient {
            if let Some(ints) = operands.iter().map(|v| v.as_i64()).collect::<Option<Vec<_>>>() {
                if let Some(result) = fold_ints(self.op, &ints) {
                    return Ok(Value::from(result));
                }
            }
        }

        let floats = operands
            .iter()
            .map(|v| as_number(v))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                ModuleFault::new(format!("answer {}: {:?} needs numeric params", name, self.op))
            })?;
        let mut iter = floats.into_iter();
        let first = iter.next().unwrap_or(0.0);
        let result = iter.try_fold(first, |acc, x| match self.op {
            AnswerOp::Sum => Ok(acc + x),
            AnswerOp::Difference => Ok(acc - x),
            AnswerOp::Product => Ok(acc * x),
            AnswerOp::Quotient if x == 0.0 => Err(ModuleFault::new(format!(
                "answer {}: division by zero",
                name
            ))),
            _ => Ok(acc / x),
        })?;
        if !result.is_finite() {
            return Err(ModuleFault::new(format!("answer {}: result is not finite", name)));
        }
        Ok(Value::from(result))
    }
}

fn fold_ints(op: AnswerOp, ints: &[i64]) -> Option<i64> {
    let (first, rest) = ints.split_first()?;
    rest.iter().try_fold(*first, |acc, x| match op {
        AnswerOp::Sum => acc.checked_add(*x),
        AnswerOp::Difference => acc.checked_sub(*x),
        AnswerOp::Product => acc.checked_mul(*x),
        _ => None,
    })
}

fn rng_for_seed(variant_seed: &str) -> StdRng {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"calculation-variant");
    hasher.update(variant_seed.as_bytes());
    StdRng::from_seed(*hasher.finalize().as_bytes())
}

/// Replace `{{key}}` in `template` with values from `fields`, HTML-escaped.
///
/// One pass over the template: substituted text is never rescanned. Earlier
/// objects in `fields` win on duplicate keys; unknown placeholders stay as-is.
fn fill(template: &str, fields: &[&Value]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            rest = &rest[start..];
            break;
        };
        let key = &after[..end];
        match fields.iter().find_map(|object| object.get(key)) {
            Some(Value::String(s)) => out.push_str(&escape_html(s)),
            Some(other) => out.push_str(&escape_html(&other.to_string())),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// A loaded `server.toml`.
pub struct CalculationModule {
    spec: CalculationSpec,
}

impl CalculationModule {
    pub fn from_toml(source: &str) -> Result<Self, ModuleFault> {
        let spec: CalculationSpec = toml::from_str(source)
            .map_err(|e| ModuleFault::new(format!("invalid {}: {}", CALCULATION_ENTRY_FILE, e)))?;
        if spec.answers.is_empty() {
            return Err(ModuleFault::new("no answers declared"));
        }
        for (name, param) in &spec.params {
            param.validate(name)?;
        }
        for (name, answer) in &spec.answers {
            answer.validate(name, &spec.params)?;
        }
        Ok(Self { spec })
    }

    fn comparator_for(&self, field: &str, expected: &Value) -> Box<dyn AnswerComparator> {
        if expected.is_number() && !self.spec.grading.exact.iter().any(|f| f == field) {
            let defaults = NumericComparator::default();
            Box::new(NumericComparator {
                rtol: self.spec.grading.rtol.unwrap_or(defaults.rtol),
                atol: self.spec.grading.atol.unwrap_or(defaults.atol),
            })
        } else {
            Box::new(ExactComparator)
        }
    }
}

impl QuestionModule for CalculationModule {
    fn get_data(
        &self,
        variant_seed: &str,
        _options: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<GeneratedData, ModuleFault> {
        let mut rng = rng_for_seed(variant_seed);
        let mut params = Map::new();
        for (name, spec) in &self.spec.params {
            params.insert(name.clone(), spec.sample(&mut rng));
        }

        let mut true_answer = Map::new();
        for (name, spec) in &self.spec.answers {
            true_answer.insert(name.clone(), spec.evaluate(name, &params)?);
        }

        Ok(GeneratedData {
            params: Some(Value::Object(params)),
            true_answer: Some(Value::Object(true_answer)),
            options: self.spec.options.clone(),
        })
    }

    fn grade_answer(
        &self,
        variant: &Variant,
        submitted_answer: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<GradeOutcome, ModuleFault> {
        let mut correct = Map::new();
        let mut matched = 0usize;
        for field in self.spec.answers.keys() {
            let expected = variant.true_answer.get(field).unwrap_or(&Value::Null);
            let ok = match submitted_answer.get(field) {
                Some(submitted) => self.comparator_for(field, expected).matches(expected, submitted),
                None => false,
            };
            if ok {
                matched += 1;
            }
            correct.insert(field.clone(), Value::Bool(ok));
        }
        let total = self.spec.answers.len();
        Ok(GradeOutcome {
            score: matched as f64 / total as f64,
            feedback: Some(json!({ "correct": correct })),
        })
    }

    fn render(
        &self,
        variant: &Variant,
        submissions: &[GradedSubmission],
        selection: RenderSelection,
        _ctx: &ExecutionContext,
    ) -> Option<Result<RenderedQuestion, ModuleFault>> {
        let render = self.spec.render.as_ref()?;
        let question_html = if selection.question {
            fill(&render.question, &[&variant.params])
        } else {
            String::new()
        };
        let submission_htmls = submissions
            .iter()
            .map(|s| {
                if selection.submissions {
                    let score = json!({ "score": format!("{:.0}%", s.score * 100.0) });
                    fill(&render.submission, &[&s.submitted_answer, &score])
                } else {
                    String::new()
                }
            })
            .collect();
        let answer_html = if selection.answer {
            fill(&render.answer, &[&variant.true_answer, &variant.params])
        } else {
            String::new()
        };
        Some(Ok(RenderedQuestion {
            extra_headers_html: render.headers.clone(),
            question_html,
            submission_htmls,
            answer_html,
        }))
    }

    fn get_file(
        &self,
        filename: &str,
        _variant: &Variant,
        ctx: &ExecutionContext,
    ) -> Result<Vec<u8>, ModuleFault> {
        let spec = self
            .spec
            .files
            .get(filename)
            .ok_or_else(|| ModuleFault::new(format!("module provides no file named {}", filename)))?;
        Ok(ctx.read(spec)?)
    }
}

/// Loads `server.toml` entry files.
#[derive(Debug, Clone, Default)]
pub struct CalculationDialect;

impl ModuleDialect for CalculationDialect {
    fn name(&self) -> &str {
        "calculation"
    }

    fn entry_file(&self) -> &str {
        CALCULATION_ENTRY_FILE
    }

    fn load(
        &self,
        entry: &Path,
        _ctx: &ExecutionContext,
    ) -> Result<Arc<dyn QuestionModule>, ModuleFault> {
        let source = std::fs::read_to_string(entry)
            .map_err(|e| ModuleFault::new(format!("cannot read {}: {}", entry.display(), e)))?;
        Ok(Arc::new(CalculationModule::from_toml(&source)?))
    }
}
