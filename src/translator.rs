//! Translator backed by a local Ollama-style completion endpoint.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use fm_core::config::TranslatorConfig;
use fm_pipeline::{TranslateContext, Translator};

fn think_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").unwrap())
}

fn command_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(ffmpeg[^`\n]*)").unwrap())
}

pub struct OllamaTranslator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaTranslator {
    pub fn new(config: &TranslatorConfig) -> fm_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| fm_core::Error::Internal(format!("http client setup failed: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }

    fn build_prompt(&self, request: &str, ctx: &TranslateContext) -> String {
        let mut prompt = String::new();
        prompt.push_str(
            "You translate video editing requests into a single ffmpeg command.\n\
             Rules:\n\
             - Reply with exactly one command on one line, nothing else.\n\
             - The command must start with ffmpeg.\n",
        );
        prompt.push_str(&format!(
            "- Read from {} and write to output.{} (change the output \
             extension only if the request asks for another format).\n",
            ctx.input_name, ctx.input_ext
        ));
        prompt.push_str(
            "- Use bare filenames only: no directories, no shell operators, \
             no other programs.\n",
        );

        if let Some(ref summary) = ctx.media_summary {
            prompt.push_str(&format!("\nInput file info: {summary}\n"));
        }
        if !ctx.assets.is_empty() {
            prompt.push_str(&format!(
                "\nAvailable auxiliary files: {}\n",
                ctx.assets.join(", ")
            ));
        }
        if let (Some(prev), Some(err)) = (&ctx.previous_command, &ctx.previous_error) {
            prompt.push_str(&format!(
                "\nYour previous command failed.\nCommand: {prev}\nError: {err}\n\
                 Produce a corrected command.\n"
            ));
        }

        prompt.push_str(&format!("\nRequest: {request}\n"));
        prompt
    }

    /// Pull the command line out of a raw model completion: reasoning
    /// blocks are stripped, then the first line starting with `ffmpeg`
    /// wins, then any embedded `ffmpeg ...` run of text.
    fn extract_command(raw: &str) -> Option<String> {
        let cleaned = think_block_re().replace_all(raw, "");

        for line in cleaned.lines() {
            let line = line.trim().trim_start_matches('`').trim_end_matches('`');
            if line.starts_with("ffmpeg") {
                return Some(line.to_string());
            }
        }

        command_re()
            .captures(&cleaned)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    }
}

#[async_trait]
impl Translator for OllamaTranslator {
    async fn translate(
        &self,
        request: &str,
        ctx: &TranslateContext,
    ) -> fm_core::Result<String> {
        let prompt = self.build_prompt(request, ctx);
        tracing::debug!("translator prompt:\n{prompt}");

        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| fm_core::Error::Internal(format!("translator request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(fm_core::Error::Internal(format!(
                "translator endpoint returned {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| fm_core::Error::Internal(format!("translator response unreadable: {e}")))?;

        // Ollama puts the completion in `response`; OpenAI-compatible
        // servers in `choices[0].text`.
        let text = payload["response"]
            .as_str()
            .or_else(|| payload["choices"][0]["text"].as_str())
            .ok_or_else(|| {
                fm_core::Error::Internal("translator response carried no completion".into())
            })?;

        Self::extract_command(text).ok_or_else(|| {
            fm_core::Error::Validation(format!(
                "translator produced no ffmpeg command: {}",
                text.trim()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_command() {
        let raw = "ffmpeg -i input.mp4 output.mp4";
        assert_eq!(
            OllamaTranslator::extract_command(raw).as_deref(),
            Some("ffmpeg -i input.mp4 output.mp4")
        );
    }

    #[test]
    fn strips_reasoning_blocks() {
        let raw = "<think>\nffmpeg -i wrong.mp4 bad.mp4\n</think>\nffmpeg -i input.mp4 output.gif";
        assert_eq!(
            OllamaTranslator::extract_command(raw).as_deref(),
            Some("ffmpeg -i input.mp4 output.gif")
        );
    }

    #[test]
    fn unwraps_code_fences() {
        let raw = "Here you go:\n```\nffmpeg -i input.mp4 -an output.mp4\n```";
        assert_eq!(
            OllamaTranslator::extract_command(raw).as_deref(),
            Some("ffmpeg -i input.mp4 -an output.mp4")
        );
    }

    #[test]
    fn falls_back_to_embedded_command() {
        let raw = "Sure! Use `ffmpeg -i input.mp4 output.webm` for that.";
        assert_eq!(
            OllamaTranslator::extract_command(raw).as_deref(),
            Some("ffmpeg -i input.mp4 output.webm")
        );
    }

    #[test]
    fn no_command_yields_none() {
        assert_eq!(OllamaTranslator::extract_command("I cannot help."), None);
    }

    #[test]
    fn prompt_carries_failure_feedback() {
        let translator = OllamaTranslator::new(&TranslatorConfig::default()).unwrap();
        let ctx = TranslateContext {
            input_name: "input_2.mp4".into(),
            input_ext: "mp4".into(),
            previous_command: Some("ffmpeg -i input_2.mp4 -vf bogus output.mp4".into()),
            previous_error: Some("Unrecognized option".into()),
            ..Default::default()
        };
        let prompt = translator.build_prompt("speed it up", &ctx);
        assert!(prompt.contains("input_2.mp4"));
        assert!(prompt.contains("Unrecognized option"));
        assert!(prompt.contains("speed it up"));
    }
}
