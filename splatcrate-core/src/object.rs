//! Render objects and their identifiers

use std::rc::Rc;

use crate::transform::TransformComponent;

/// Identifier of a render object, unique within one [`ObjectIdAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

/// Hands out monotonically increasing object ids.
///
/// The allocator is owned by the application and must only be used from the
/// thread that drives the frame loop. It keeps a plain counter; callers that
/// share it across threads need to wrap it themselves.
#[derive(Debug, Default)]
pub struct ObjectIdAllocator {
    next: u32,
}

impl ObjectIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next id
    pub fn allocate(&mut self) -> ObjectId {
        let id = ObjectId(self.next);
        self.next = self
            .next
            .checked_add(1)
            .expect("object id space exhausted");
        id
    }

    /// Number of ids handed out so far
    pub fn allocated(&self) -> u32 {
        self.next
    }
}

/// Geometry attached to a render object: nothing, a mesh, or a splat cloud.
#[derive(Debug)]
pub enum Geometry<M, S> {
    Empty,
    Mesh(Rc<M>),
    Splat(Rc<S>),
}

impl<M, S> Geometry<M, S> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Geometry::Empty)
    }

    pub fn mesh(&self) -> Option<&Rc<M>> {
        match self {
            Geometry::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn splat(&self) -> Option<&Rc<S>> {
        match self {
            Geometry::Splat(splat) => Some(splat),
            _ => None,
        }
    }
}

impl<M, S> Clone for Geometry<M, S> {
    fn clone(&self) -> Self {
        match self {
            Geometry::Empty => Geometry::Empty,
            Geometry::Mesh(mesh) => Geometry::Mesh(Rc::clone(mesh)),
            Geometry::Splat(splat) => Geometry::Splat(Rc::clone(splat)),
        }
    }
}

impl<M, S> Default for Geometry<M, S> {
    fn default() -> Self {
        Geometry::Empty
    }
}

/// Something the frame loop draws: a transform plus optional geometry.
///
/// Objects are move-only; the id is fixed at creation.
#[derive(Debug)]
pub struct RenderObject<M, S> {
    id: ObjectId,
    pub transform: TransformComponent,
    pub geometry: Geometry<M, S>,
}

impl<M, S> RenderObject<M, S> {
    /// Create an empty object with a fresh id from `ids`
    pub fn new(ids: &mut ObjectIdAllocator) -> Self {
        Self {
            id: ids.allocate(),
            transform: TransformComponent::identity(),
            geometry: Geometry::Empty,
        }
    }

    /// Create an object holding a mesh
    pub fn with_mesh(ids: &mut ObjectIdAllocator, mesh: Rc<M>) -> Self {
        let mut object = Self::new(ids);
        object.geometry = Geometry::Mesh(mesh);
        object
    }

    /// Create an object holding a splat cloud
    pub fn with_splat(ids: &mut ObjectIdAllocator, splat: Rc<S>) -> Self {
        let mut object = Self::new(ids);
        object.geometry = Geometry::Splat(splat);
        object
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }
}
