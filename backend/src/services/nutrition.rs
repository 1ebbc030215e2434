use serde_json::{json, Value};

use crate::config::Config;
use shared::NutritionFacts;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODEL: &str = "gpt-4o-mini";
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";

/// Nutrition estimation collaborator. Asks the configured AI backend for
/// nutrition facts and degrades to absent fields on any failure: a broken
/// upstream must never fail the food-log operation that triggered it.
#[derive(Clone)]
pub struct NutritionEstimator {
    client: reqwest::Client,
    provider: Provider,
}

#[derive(Clone)]
enum Provider {
    OpenAi { api_key: String },
    Anthropic { api_key: String },
    Disabled,
}

impl NutritionEstimator {
    pub fn from_config(config: &Config) -> Self {
        let provider = match config.preferred_ai.as_str() {
            "openai" => match &config.openai_api_key {
                Some(key) => Provider::OpenAi {
                    api_key: key.clone(),
                },
                None => {
                    log::warn!("PREFERRED_AI=openai but OPENAI_API_KEY is unset; estimation disabled");
                    Provider::Disabled
                }
            },
            "anthropic" => match &config.anthropic_api_key {
                Some(key) => Provider::Anthropic {
                    api_key: key.clone(),
                },
                None => {
                    log::warn!(
                        "PREFERRED_AI=anthropic but ANTHROPIC_API_KEY is unset; estimation disabled"
                    );
                    Provider::Disabled
                }
            },
            _ => Provider::Disabled,
        };

        Self {
            client: reqwest::Client::new(),
            provider,
        }
    }

    /// Estimate nutrition facts for a portion of food. Never fails: transport
    /// or parse problems yield absent fields.
    pub async fn estimate(&self, food_name: &str, portion_size: &str) -> NutritionFacts {
        let prompt = build_prompt(food_name, portion_size);

        let text = match &self.provider {
            Provider::OpenAi { api_key } => self.ask_openai(api_key, &prompt).await,
            Provider::Anthropic { api_key } => self.ask_anthropic(api_key, &prompt).await,
            Provider::Disabled => return NutritionFacts::default(),
        };

        match text {
            Ok(text) => parse_facts(&text),
            Err(e) => {
                log::warn!("Nutrition estimation failed for '{}': {}", food_name, e);
                NutritionFacts::default()
            }
        }
    }

    async fn ask_openai(&self, api_key: &str, prompt: &str) -> Result<String, reqwest::Error> {
        let body = json!({
            "model": OPENAI_MODEL,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": 200,
            "temperature": 0.0,
        });

        let response: Value = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn ask_anthropic(&self, api_key: &str, prompt: &str) -> Result<String, reqwest::Error> {
        let body = json!({
            "model": ANTHROPIC_MODEL,
            "max_tokens": 200,
            "temperature": 0,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response: Value = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response["content"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}

fn build_prompt(food_name: &str, portion_size: &str) -> String {
    format!(
        "Estimate the nutrition facts in {} of {}. Respond with only a JSON object \
         with the numeric fields calories, protein, carbohydrates, fiber, fat and \
         sugar (grams, calories in kcal). No other text.",
        portion_size, food_name
    )
}

/// Parse the model's reply into nutrition facts. Each field is salvaged
/// independently; anything unreadable becomes `None`.
fn parse_facts(text: &str) -> NutritionFacts {
    let Some(object) = extract_json_object(text) else {
        log::warn!("Could not parse nutrition response: {}", text);
        return NutritionFacts::default();
    };

    NutritionFacts {
        calories: field_as_number(&object, "calories"),
        protein: field_as_number(&object, "protein"),
        carbohydrates: field_as_number(&object, "carbohydrates"),
        fiber: field_as_number(&object, "fiber"),
        fat: field_as_number(&object, "fat"),
        sugar: field_as_number(&object, "sugar"),
    }
}

/// Models sometimes wrap the JSON in prose or code fences; take the outermost
/// braces and try that.
fn extract_json_object(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        if value.is_object() {
            return Some(value);
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    serde_json::from_str(&text[start..=end]).ok().filter(Value::is_object)
}

fn field_as_number(object: &Value, field: &str) -> Option<f64> {
    match object.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Salvage a number from free text, keeping digits and the decimal point.
fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_salvages_units() {
        assert_eq!(parse_number("95"), Some(95.0));
        assert_eq!(parse_number("95.5 kcal"), Some(95.5));
        assert_eq!(parse_number("about 12 g"), Some(12.0));
        assert_eq!(parse_number("unknown"), None);
        assert_eq!(parse_number("1.2.3"), None);
    }

    #[test]
    fn test_parse_facts_full_object() {
        let facts = parse_facts(
            r#"{"calories": 95, "protein": 0.5, "carbohydrates": 25, "fiber": 4.4, "fat": 0.3, "sugar": 19}"#,
        );

        assert_eq!(facts.calories, Some(95.0));
        assert_eq!(facts.protein, Some(0.5));
        assert_eq!(facts.sugar, Some(19.0));
        assert!(!facts.is_unavailable());
    }

    #[test]
    fn test_parse_facts_fields_fail_independently() {
        let facts =
            parse_facts(r#"{"calories": "95 kcal", "protein": "trace", "fat": null, "sugar": 19}"#);

        assert_eq!(facts.calories, Some(95.0));
        assert_eq!(facts.protein, None);
        assert_eq!(facts.carbohydrates, None);
        assert_eq!(facts.fat, None);
        assert_eq!(facts.sugar, Some(19.0));
    }

    #[test]
    fn test_parse_facts_json_wrapped_in_prose() {
        let facts = parse_facts(
            "Here is the estimate:\n```json\n{\"calories\": 120, \"protein\": 3}\n```",
        );

        assert_eq!(facts.calories, Some(120.0));
        assert_eq!(facts.protein, Some(3.0));
    }

    #[test]
    fn test_parse_facts_garbage_is_unavailable() {
        assert!(parse_facts("I cannot help with that.").is_unavailable());
        assert!(parse_facts("").is_unavailable());
    }

    #[test]
    fn test_build_prompt_mentions_portion_and_food() {
        let prompt = build_prompt("apple", "1 medium");
        assert!(prompt.contains("1 medium of apple"));
    }

    #[tokio::test]
    async fn test_disabled_estimator_returns_unavailable() {
        let estimator = NutritionEstimator {
            client: reqwest::Client::new(),
            provider: Provider::Disabled,
        };

        let facts = estimator.estimate("apple", "1 medium").await;
        assert!(facts.is_unavailable());
    }
}
