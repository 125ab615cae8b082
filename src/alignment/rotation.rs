//! Euler angle rotations in the ZYZ convention.

use nalgebra::Matrix3;

/// Build the rotation matrix `R = Rz(gamma) Ry(beta) Rz(alpha)`.
pub fn euler_to_rotation(alpha: f64, beta: f64, gamma: f64) -> Matrix3<f64> {
    let (sa, ca) = alpha.sin_cos();
    let (sb, cb) = beta.sin_cos();
    let (sg, cg) = gamma.sin_cos();

    Matrix3::new(
        -sa * sg + ca * cb * cg,
        -ca * sg - sa * cb * cg,
        sb * cg,
        sa * cg + ca * cb * sg,
        ca * cg - sa * cb * sg,
        sb * sg,
        -ca * sb,
        sa * sb,
        cb,
    )
}

/// Rotate a tensor into or out of a domain frame.
///
/// When `inverse` is set the tensor is rotated as `R^T A R`, otherwise as
/// `R A R^T`.
pub fn rotate_tensor(rotation: &Matrix3<f64>, tensor: &Matrix3<f64>, inverse: bool) -> Matrix3<f64> {
    if inverse {
        rotation.transpose() * tensor * rotation
    } else {
        rotation * tensor * rotation.transpose()
    }
}
