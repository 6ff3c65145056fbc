// LilyPond score output for solfa sequences.
//
// Builds a single-staff .ly document with one quarter note per observation and
// the solfa syllables attached as lyrics, then engraves it to PDF with the
// `lilypond` binary. Pitches are written absolute (not \relative) using the
// spelling the detector reported, so C#4 stays `cis'` rather than `des'`.

use async_trait::async_trait;
use lashir_common::{Accidental, KeyContext, Mode, SolfaNote};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::notation_renderer::{ArtifactRef, NotationRenderer, RendererError};

/// Notes per line before a manual break is suggested to LilyPond
const NOTES_PER_LINE: usize = 16;

/// Major key signature names by tonic pitch class (conventional spellings)
const MAJOR_KEY_NAMES: [&str; 12] = [
    "c", "des", "d", "ees", "e", "f", "fis", "g", "aes", "a", "bes", "b",
];

/// Minor key signature names by tonic pitch class
const MINOR_KEY_NAMES: [&str; 12] = [
    "c", "cis", "d", "ees", "e", "f", "fis", "g", "gis", "a", "bes", "b",
];

/// LilyPond absolute pitch for a spelled note.
///
/// LilyPond's unmarked `c` is C3; each `'` raises and each `,` lowers one octave.
pub fn ly_pitch(letter: &str, accidental: Accidental, octave: i32) -> String {
    let mut out = letter.to_ascii_lowercase();
    match accidental {
        Accidental::Natural => {}
        Accidental::Sharp => out.push_str("is"),
        // "ees"/"aes" are LilyPond's spellings for E-flat and A-flat
        Accidental::Flat => out.push_str("es"),
    }
    let marks = octave - 3;
    if marks > 0 {
        out.extend(std::iter::repeat('\'').take(marks as usize));
    } else if marks < 0 {
        out.extend(std::iter::repeat(',').take((-marks) as usize));
    }
    out
}

/// `\key` command for the detected key; undetermined keys engrave in C major
pub fn ly_key(key: &KeyContext) -> String {
    let tonic = key.tonic.value() as usize;
    match key.mode {
        Mode::Major => format!("\\key {} \\major", MAJOR_KEY_NAMES[tonic]),
        Mode::Minor => format!("\\key {} \\minor", MINOR_KEY_NAMES[tonic]),
        Mode::Undetermined => "\\key c \\major".to_string(),
    }
}

/// Complete .ly source for `notes` under `key`
pub fn score_source(notes: &[SolfaNote], key: &KeyContext, title: &str) -> String {
    let mut ly = String::new();

    ly.push_str("\\version \"2.24.0\"\n\n");
    let _ = write!(
        ly,
        "\\header {{\n  title = \"{}\"\n  subtitle = \"{}\"\n  tagline = ##f\n}}\n\n",
        title.replace('"', "\\\""),
        key
    );

    let mut music = String::new();
    for (i, note) in notes.iter().enumerate() {
        if i > 0 {
            music.push(if i % NOTES_PER_LINE == 0 { '\n' } else { ' ' });
            if i % NOTES_PER_LINE == 0 {
                music.push_str("    ");
            }
        }
        let pitch = ly_pitch(
            note.pitch.letter.as_str(),
            note.pitch.accidental,
            note.pitch.octave,
        );
        let _ = write!(music, "{}4", pitch);
    }

    let lyrics: Vec<&str> = notes.iter().map(|note| note.syllable.as_str()).collect();

    let _ = write!(
        ly,
        "melody = \\absolute {{\n  {} \\time 4/4\n    {}\n}}\n\n",
        ly_key(key),
        music
    );
    let _ = write!(ly, "solfa = \\lyricmode {{\n  {}\n}}\n\n", lyrics.join(" "));

    ly.push_str("\\score {\n  <<\n");
    ly.push_str("    \\new Staff { \\melody }\n");
    ly.push_str("    \\addlyrics { \\solfa }\n");
    ly.push_str("  >>\n  \\layout { }\n}\n");

    ly
}

/// Renderer that engraves a PDF with the `lilypond` binary
///
/// Artifacts land in `output_dir` as `<id>.pdf` and are referenced as
/// `<public_path>/<id>.pdf`, the URL under which `output_dir` is served.
pub struct LilypondRenderer {
    program: String,
    output_dir: PathBuf,
    public_path: String,
    timeout: Duration,
}

impl LilypondRenderer {
    pub fn new(
        program: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        public_path: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            output_dir: output_dir.into(),
            public_path: public_path.into(),
            timeout,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn artifact_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.public_path.trim_end_matches('/'), file_name)
    }
}

#[async_trait]
impl NotationRenderer for LilypondRenderer {
    fn name(&self) -> &str {
        "lilypond"
    }

    async fn render(
        &self,
        notes: &[SolfaNote],
        key: &KeyContext,
    ) -> Result<ArtifactRef, RendererError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let id = uuid::Uuid::new_v4().to_string();
        let source_path = self.output_dir.join(format!("{}.ly", id));
        let output_stem = self.output_dir.join(&id);
        let pdf_path = self.output_dir.join(format!("{}.pdf", id));

        tokio::fs::write(&source_path, score_source(notes, key, "Lashir")).await?;
        debug!(source = %source_path.display(), notes = notes.len(), "Engraving score");

        let child = Command::new(&self.program)
            .arg("--pdf")
            .arg("-o")
            .arg(&output_stem)
            .arg(&source_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RendererError::Spawn(format!("{}: {}", self.program, e)))?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        if let Err(e) = tokio::fs::remove_file(&source_path).await {
            warn!(path = %source_path.display(), error = %e, "Failed to remove score source");
        }

        let output = result.map_err(|_| RendererError::Timeout(self.timeout))??;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RendererError::Failed(format!(
                "Exit code: {:?}, stderr: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        if !tokio::fs::try_exists(&pdf_path).await? {
            return Err(RendererError::NoArtifact);
        }

        Ok(ArtifactRef::new(self.artifact_url(&format!("{}.pdf", id))))
    }
}
