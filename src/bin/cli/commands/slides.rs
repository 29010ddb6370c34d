use clap::{Subcommand, ValueEnum};
use smart_student::images::ImageSearchQuery;
use smart_student::slides::{SlideLanguage, SlidesRequest};

use crate::client::SmartStudentClient;
use crate::output::{self, OutputConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LanguageArg {
    Es,
    En,
}

impl From<LanguageArg> for SlideLanguage {
    fn from(language: LanguageArg) -> Self {
        match language {
            LanguageArg::Es => SlideLanguage::Es,
            LanguageArg::En => SlideLanguage::En,
        }
    }
}

/// Slide commands
#[derive(Subcommand, Debug)]
pub enum SlidesCommands {
    /// Generate the slides of a presentation
    Generate {
        /// Topic of the presentation
        topic: String,
        /// Subject the topic belongs to
        subject: String,
        /// Number of slides, 1 to 30
        #[clap(long, default_value_t = 5)]
        count: u32,
        /// Language of the slides
        #[clap(long, value_enum, default_value_t = LanguageArg::Es)]
        language: LanguageArg,
    },
    /// Find background images for a topic
    Images {
        topic: String,
        #[clap(default_value = "")]
        subject: String,
        /// Number of images, 1 to 30
        #[clap(short, long)]
        n: Option<usize>,
        /// Let Gemini propose a different query per image
        #[clap(long)]
        ai: bool,
    },
}

/// Executes a slide command
pub async fn execute(
    client: &SmartStudentClient,
    cmd: SlidesCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        SlidesCommands::Generate { topic, subject, count, language } => {
            let request = SlidesRequest { topic, subject, slide_count: count, language: language.into() };
            let response = client.generate_slides(&request).await?;
            output::print_slides(&response, config);
        }
        SlidesCommands::Images { topic, subject, n, ai } => {
            let query = ImageSearchQuery { topic, subject, n, ai: ai.then(|| "gemini".to_string()) };
            let response = client.search_images(&query).await?;
            output::print_image_search(&response, config);
        }
    }
    Ok(())
}
