//! Writing meshes to disk.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use cmb2sphere_core::Result;

use crate::mesh::Mesh;
use crate::{ply, stl};

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeshFormat {
    /// Binary STL.
    #[default]
    Stl,
    /// ASCII PLY.
    Ply,
}

impl MeshFormat {
    /// Picks the format from the file extension; anything but `.ply` is STL.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("ply") => Self::Ply,
            _ => Self::Stl,
        }
    }

    /// Encodes `mesh` into `writer`.
    pub fn write<W: Write>(self, mesh: &Mesh, writer: &mut W) -> Result<()> {
        match self {
            Self::Stl => stl::write_stl(mesh, writer),
            Self::Ply => ply::write_ply(mesh, writer),
        }
    }
}

/// Writes `mesh` to `path` in the format implied by its extension.
///
/// The file is written next to the target and renamed into place, so a
/// failed export never leaves a partial file at `path`.
pub fn save_mesh(mesh: &Mesh, path: &Path) -> Result<MeshFormat> {
    let format = MeshFormat::from_path(path);
    let tmp = staging_path(path);

    let written: Result<()> = File::create(&tmp).map_err(Into::into).and_then(|file| {
        let mut writer = BufWriter::new(file);
        format.write(mesh, &mut writer)?;
        writer.flush()?;
        Ok(())
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;

    log::info!(
        "wrote {} triangles to {} ({format:?})",
        mesh.len(),
        path.display()
    );
    Ok(format)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
