//! Loading and storing models on disk, either as JSON or as MessagePack.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, bail};

use crate::{
    model::Model,
    restrict::{PassStats, RestrictPass},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFormat {
    Json,
    MsgPack,
}

impl ModelFormat {
    /// Detect the format from the file extension: `json`, or `msgpack`/`mp`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let extension = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match extension {
            "json" => Ok(ModelFormat::Json),
            "msgpack" | "mp" => Ok(ModelFormat::MsgPack),
            _ => bail!(
                "Unsupported model file extension {:?} for {}",
                extension,
                path.as_ref().display()
            ),
        }
    }
}

pub fn load_model<P: AsRef<Path>>(path: P) -> anyhow::Result<Model> {
    let path = path.as_ref();
    let format = ModelFormat::from_path(path)?;
    let reader = BufReader::new(
        File::open(path).with_context(|| format!("opening model {}", path.display()))?,
    );
    let model = match format {
        ModelFormat::Json => serde_json::from_reader(reader)
            .with_context(|| format!("decoding json model {}", path.display()))?,
        ModelFormat::MsgPack => rmp_serde::from_read(reader)
            .with_context(|| format!("decoding msgpack model {}", path.display()))?,
    };
    Ok(model)
}

pub fn save_model<P: AsRef<Path>>(model: &Model, path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    let format = ModelFormat::from_path(path)?;
    let mut writer = BufWriter::new(
        File::create(path).with_context(|| format!("creating {}", path.display()))?,
    );
    match format {
        ModelFormat::Json => serde_json::to_writer_pretty(&mut writer, model)?,
        ModelFormat::MsgPack => rmp_serde::encode::write_named(&mut writer, model)?,
    }
    writer.flush()?;
    Ok(())
}

/// Runs `pass` over the model stored at `input` and writes the result to `output`. Nothing is
/// written when `output` is `None` or when the pass fails, so a half rewritten model never
/// reaches the disk.
pub fn restrict_file<P: AsRef<Path>>(
    pass: &RestrictPass,
    input: P,
    output: Option<P>,
) -> anyhow::Result<PassStats> {
    let input = input.as_ref();
    let mut model = load_model(input)?;
    let stats = pass
        .run(&mut model)
        .with_context(|| format!("restricting {}", input.display()))?;
    if let Some(output) = output {
        save_model(&model, output)?;
    }
    Ok(stats)
}
