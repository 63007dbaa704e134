//! NIfTI 读写.
//!
//! `nifti` 返回的数组按 `(x, y, z, ...)` 索引, 与本 crate 的规范方向一致.

use crate::error::{ConfigError, VolumeIoError};
use crate::geometry::{Affine, VolumeGeometry};
use ndarray::{Array3, Array4, ArrayD, ArrayView3, ArrayView4, Ix3, Ix4};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

/// 从 header 中恢复几何描述.
///
/// `sform_code > 0` 时使用 sform 仿射, 否则使用以 pixdim 为对角元的仿射.
pub fn geometry_from_header(header: &NiftiHeader) -> Result<VolumeGeometry, ConfigError> {
    let [_, x, y, z, ..] = header.dim;
    let shape = [x as usize, y as usize, z as usize];
    let [_, a, b, c, ..] = header.pixdim;
    let spacing = [a, b, c].map(|v| v.abs() as f64);

    let affine = if header.sform_code > 0 {
        let row = |r: [f32; 4]| r.map(|v| v as f64);
        Affine::from_rows([
            row(header.srow_x),
            row(header.srow_y),
            row(header.srow_z),
            [0.0, 0.0, 0.0, 1.0],
        ])?
    } else {
        Affine::from_spacing(spacing)?
    };
    VolumeGeometry::new(shape, spacing, affine)
}

/// 根据几何描述生成写出用的 header.
pub fn header_from_geometry(geometry: &VolumeGeometry) -> NiftiHeader {
    let rows = geometry.affine().to_rows();
    let [a, b, c] = geometry.spacing();
    let to_f32 = |r: [f64; 4]| r.map(|v| v as f32);
    let mut header = NiftiHeader::default();
    header.pixdim = [1.0, a as f32, b as f32, c as f32, 1.0, 1.0, 1.0, 1.0];
    // sform_code = 2 (aligned anat)
    header.sform_code = 2;
    header.qform_code = 0;
    header.srow_x = to_f32(rows[0]);
    header.srow_y = to_f32(rows[1]);
    header.srow_z = to_f32(rows[2]);
    header
}

fn open_nifti<P: AsRef<Path>>(path: P) -> Result<(ArrayD<f32>, VolumeGeometry), VolumeIoError> {
    let obj = ReaderOptions::new().read_file(path.as_ref())?;
    let geometry = geometry_from_header(obj.header())?;
    let data = obj.into_volume().into_ndarray::<f32>()?;
    Ok((data, geometry))
}

/// 打开 4D 体数据 (例如 peaks, TOM).
pub fn open_nifti_4d<P: AsRef<Path>>(
    path: P,
) -> Result<(Array4<f32>, VolumeGeometry), VolumeIoError> {
    let (data, geometry) = open_nifti(path)?;
    let found = data.ndim();
    let data = data
        .into_dimensionality::<Ix4>()
        .map_err(|_| VolumeIoError::Dimensionality { expected: 4, found })?;
    Ok((data.as_standard_layout().into_owned(), geometry))
}

/// 打开 3D 体数据 (例如标量图).
pub fn open_nifti_3d<P: AsRef<Path>>(
    path: P,
) -> Result<(Array3<f32>, VolumeGeometry), VolumeIoError> {
    let (data, geometry) = open_nifti(path)?;
    let found = data.ndim();
    let data = data
        .into_dimensionality::<Ix3>()
        .map_err(|_| VolumeIoError::Dimensionality { expected: 3, found })?;
    Ok((data.as_standard_layout().into_owned(), geometry))
}

/// 打开二值掩膜. 非零体素为前景.
pub fn open_mask<P: AsRef<Path>>(path: P) -> Result<(Array3<bool>, VolumeGeometry), VolumeIoError> {
    let (data, geometry) = open_nifti_3d(path)?;
    Ok((data.mapv(|v| v != 0.0), geometry))
}

/// 保存 3D 浮点体数据.
pub fn save_nifti_3d<P: AsRef<Path>>(
    path: P,
    data: ArrayView3<f32>,
    geometry: &VolumeGeometry,
) -> Result<(), VolumeIoError> {
    let header = header_from_geometry(geometry);
    WriterOptions::new(path.as_ref())
        .reference_header(&header)
        .write_nifti(&data)?;
    Ok(())
}

/// 保存 4D 浮点体数据.
pub fn save_nifti_4d<P: AsRef<Path>>(
    path: P,
    data: ArrayView4<f32>,
    geometry: &VolumeGeometry,
) -> Result<(), VolumeIoError> {
    let header = header_from_geometry(geometry);
    WriterOptions::new(path.as_ref())
        .reference_header(&header)
        .write_nifti(&data)?;
    Ok(())
}

/// 以 `u8` 保存二值掩膜.
pub fn save_mask<P: AsRef<Path>>(
    path: P,
    mask: ArrayView3<bool>,
    geometry: &VolumeGeometry,
) -> Result<(), VolumeIoError> {
    let header = header_from_geometry(geometry);
    let data = mask.mapv(u8::from);
    WriterOptions::new(path.as_ref())
        .reference_header(&header)
        .write_nifti(&data)?;
    Ok(())
}
