use std::path::PathBuf;

use anyhow::Context;

/// `<file.gltf|file.glb> [instances] [frames]`
#[derive(Debug, Clone, PartialEq)]
pub struct AppArgs {
    pub file: PathBuf,
    pub instances: usize,
    pub frames: usize,
}

impl AppArgs {
    pub const USAGE: &'static str = "<file.gltf|file.glb> [instances=1] [frames=3]";

    pub fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut args = args.into_iter();
        let file = args.next().with_context(|| format!("missing file, usage: {}", Self::USAGE))?;
        let instances = match args.next() {
            Some(s) => s.parse().with_context(|| format!("invalid instance count `{s}`"))?,
            None => 1,
        };
        let frames = match args.next() {
            Some(s) => s.parse().with_context(|| format!("invalid frame count `{s}`"))?,
            None => 3,
        };
        anyhow::ensure!(instances > 0, "instance count must be at least 1");
        Ok(Self {
            file: PathBuf::from(file),
            instances,
            frames,
        })
    }
}
