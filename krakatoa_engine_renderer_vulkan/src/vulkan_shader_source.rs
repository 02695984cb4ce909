/// SpirvDirectory - loads compiled shaders from disk

use krakatoa_engine::krakatoa::pipeline::ShaderSource;
use krakatoa_engine::krakatoa::Result;
use krakatoa_engine::engine_err;
use std::path::PathBuf;

/// Reads `<root>/<name>.spv`, e.g. `mesh.vert` from `shaders/mesh.vert.spv`
#[derive(Debug, Clone)]
pub struct SpirvDirectory {
    root: PathBuf,
}

impl SpirvDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.spv", name))
    }
}

impl ShaderSource for SpirvDirectory {
    fn load(&self, name: &str) -> Result<Vec<u32>> {
        let path = self.path_of(name);
        let mut file = std::fs::File::open(&path)
            .map_err(|e| engine_err!("krakatoa::vulkan", "Failed to open shader {}: {}", path.display(), e))?;
        // read_spv checks the magic number and word alignment
        ash::util::read_spv(&mut file)
            .map_err(|e| engine_err!("krakatoa::vulkan", "Invalid SPIR-V in {}: {}", path.display(), e))
    }
}
