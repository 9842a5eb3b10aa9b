//! Integration of coefficient functions over mesh regions.

use crate::assembly::buffers::{QuadratureBuffer, QuadratureCache};
use crate::coefficient::{Coefficient, PointContext, ProxyKind};
use crate::error::Error;
use crate::mesh::{ElementId, Mesh, Region};
use crate::transformation::ElementTransformation;
use crate::Real;

/// Integrates a coefficient function over all elements of a mesh region.
///
/// The quadrature order should account for the polynomial degree of the integrand;
/// the distortion of the element maps is added automatically. Fails if the
/// coefficient is not scalar or references trial/test proxies, which are only
/// meaningful during form assembly.
pub fn integrate<T: Real>(
    coefficient: &Coefficient<T>,
    mesh: &Mesh<T>,
    region: Region,
    order: usize,
) -> Result<T, Error> {
    if coefficient.references_proxy(ProxyKind::Trial)
        || coefficient.references_proxy(ProxyKind::Test)
    {
        return Err(Error::unsupported(
            "integrate",
            "the integrand references trial/test functions outside of form assembly",
        ));
    }
    let shape = coefficient.shape(mesh.dimension())?;
    if !shape.is_scalar() {
        return Err(Error::unsupported(
            "integrate",
            format!("the integrand must be scalar, but has shape {}", shape),
        ));
    }

    let mut cache = QuadratureCache::default();
    let mut quadrature = QuadratureBuffer::default();

    let mut integral = T::zero();
    for index in 0..mesh.num_elements(region) {
        let id = match region {
            Region::Volume => ElementId::volume(index),
            Region::Boundary => ElementId::boundary(index),
        };
        let element = mesh.element(id)?;
        let transformation = ElementTransformation::new(mesh, id)?;

        let rule = cache.rule(element.geometry, order + transformation.distortion_order());
        quadrature.populate(rule, &transformation)?;

        quadrature.for_each_point(|weight, reference, mapped| {
            let ctx = PointContext {
                element: id,
                material: element.marker,
                mesh_dimension: mesh.dimension(),
                reference: *reference,
                mapped,
                trial: None,
                test: None,
            };
            let value = coefficient.evaluate(&ctx)?.into_scalar()?;
            integral += weight * mapped.measure * value;
            Ok::<(), Error>(())
        })?;
    }
    Ok(integral)
}
