use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Subcommand;
use smart_student::ocr::{OcrQuestion, OcrRequest};
use std::path::PathBuf;

use crate::client::SmartStudentClient;
use crate::output::{self, OutputConfig};

/// Answer sheet commands
#[derive(Subcommand, Debug)]
pub enum OcrCommands {
    /// Read the marked answers from a scanned answer sheet
    Analyze {
        /// Image of the answer sheet
        image: PathBuf,
        /// JSON file with the test's questions
        #[clap(long)]
        questions: Option<PathBuf>,
        /// Page of the test the image shows
        #[clap(long)]
        page: Option<u32>,
        /// Only read these question numbers; repeatable
        #[clap(long = "focus")]
        focus: Vec<u32>,
        /// Also transcribe development answers
        #[clap(long)]
        development: bool,
    },
}

/// Executes an answer sheet command
pub async fn execute(
    client: &SmartStudentClient,
    cmd: OcrCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        OcrCommands::Analyze { image, questions, page, focus, development } => {
            let image_base64 = STANDARD.encode(std::fs::read(&image)?);
            let questions: Vec<OcrQuestion> = match questions {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
                None => Vec::new(),
            };
            let request = OcrRequest {
                image_base64,
                questions,
                page_number: page,
                focus_question_nums: focus,
                focus_development: development,
            };
            let response = client.analyze_answer_sheet(&request).await?;
            output::print_ocr_response(&response, config);
        }
    }
    Ok(())
}
