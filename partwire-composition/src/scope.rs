//! Shared part instances live in [SharingScope]s. There's always a root scope, owning the default
//! (empty) sharing boundary, but export factories can create nested scopes owning other
//! boundaries. A shared part is cached in the nearest scope owning its boundary, so all imports
//! resolved within that scope see the same instance.
//!
//! Scopes also track disposable instances created within them. Disposing a scope disposes its
//! children first, then its own instances in reverse creation order. Child scopes stay attached
//! to their parent until disposed, while children refer to their parent weakly.

use crate::contract::TypeRef;
use crate::error::ExportProviderError;
use crate::instance::{ExportedValue, PartInstance};
use crate::part_definition::PartDisposer;
use crate::runtime::PartSurrogate;
use derivative::Derivative;
use fxhash::{FxHashMap, FxHashSet};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::any::Any;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Boundary owned by the root scope.
pub const ROOT_SHARING_BOUNDARY: &str = "";

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(0);

pub type ScopeId = u64;

/// Identifies a shared instance within a scope. Generic parts have one instance per set of type
/// arguments.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct InstanceKey {
    part: PartSurrogate,
    type_arguments: Vec<TypeRef>,
}

impl InstanceKey {
    pub fn new(part: PartSurrogate, type_arguments: Vec<TypeRef>) -> Self {
        Self {
            part,
            type_arguments,
        }
    }

    #[inline]
    pub fn part(&self) -> PartSurrogate {
        self.part
    }
}

/// Instance registered for disposal. Disposes the instance at most once, regardless of how many
/// owners request it.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct TrackedDisposable {
    #[derivative(Debug = "ignore")]
    instance: PartInstance,
    #[derivative(Debug = "ignore")]
    disposer: PartDisposer,
    disposed: AtomicBool,
}

impl TrackedDisposable {
    pub(crate) fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            (self.disposer)(&self.instance);
        }
    }
}

#[derive(Default)]
pub(crate) struct ScopeState {
    shared_instances: FxHashMap<InstanceKey, PartInstance>,
    under_construction: FxHashSet<InstanceKey>,
    disposables: Vec<Arc<TrackedDisposable>>,
    children: Vec<Arc<SharingScope>>,
    export_provider: Option<Weak<dyn Any + Send + Sync>>,
}

/// A container for shared part instances. See module documentation for details.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SharingScope {
    id: ScopeId,
    boundaries: Vec<String>,
    depth: usize,
    #[derivative(Debug = "ignore")]
    parent: Option<Weak<SharingScope>>,
    #[derivative(Debug = "ignore")]
    state: ReentrantMutex<RefCell<ScopeState>>,
    disposed: AtomicBool,
}

impl SharingScope {
    fn new(boundaries: Vec<String>, parent: Option<&Arc<SharingScope>>) -> Self {
        Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            boundaries,
            depth: parent.map(|parent| parent.depth + 1).unwrap_or_default(),
            parent: parent.map(Arc::downgrade),
            state: ReentrantMutex::new(RefCell::new(ScopeState::default())),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn root() -> Arc<Self> {
        Arc::new(Self::new(vec![ROOT_SHARING_BOUNDARY.to_string()], None))
    }

    /// Creates a nested scope owning given boundaries.
    pub fn new_child(
        self: &Arc<Self>,
        boundaries: Vec<String>,
    ) -> Result<Arc<Self>, ExportProviderError> {
        if self.is_disposed() {
            return Err(ExportProviderError::ScopeDisposed);
        }

        let child = Arc::new(Self::new(boundaries, Some(self)));

        let guard = self.state.lock();
        if self.is_disposed() {
            return Err(ExportProviderError::ScopeDisposed);
        }

        guard.borrow_mut().children.push(child.clone());

        trace!(
            parent = self.id,
            child = child.id,
            boundaries = ?child.boundaries,
            "Created sharing scope."
        );

        Ok(child)
    }

    #[inline]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    #[inline]
    pub fn boundaries(&self) -> &[String] {
        &self.boundaries
    }

    /// Number of ancestors of this scope.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the parent scope, unless this is a root scope or the parent is gone.
    pub fn parent(&self) -> Option<Arc<SharingScope>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Finds the nearest scope, starting with this one, owning given boundary.
    pub fn owner_of(self: &Arc<Self>, boundary: &str) -> Option<Arc<Self>> {
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            if scope.boundaries.iter().any(|owned| owned == boundary) {
                return Some(scope);
            }

            current = scope.parent();
        }

        None
    }

    /// Locks the scope for creating instances. The lock is re-entrant, so the creating thread can
    /// resolve further dependencies within the same scope. Disposal waits for the lock, so it
    /// fails if the scope got disposed while waiting.
    pub(crate) fn lock_creation(
        &self,
    ) -> Result<ReentrantMutexGuard<'_, RefCell<ScopeState>>, ExportProviderError> {
        let guard = self.state.lock();
        if self.is_disposed() {
            return Err(ExportProviderError::ScopeDisposed);
        }

        Ok(guard)
    }

    /// Returns the value under which this scope exposes its export provider, creating it if no
    /// importer holds it anymore.
    pub(crate) fn export_provider_value(
        &self,
        create: impl FnOnce() -> ExportedValue,
    ) -> ExportedValue {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();

        if let Some(value) = state.export_provider.as_ref().and_then(Weak::upgrade) {
            return value;
        }

        let value = create();
        state.export_provider = Some(Arc::downgrade(&value));
        value
    }

    pub(crate) fn shared_instance(&self, key: &InstanceKey) -> Option<PartInstance> {
        self.state.lock().borrow().shared_instances.get(key).cloned()
    }

    pub(crate) fn store_shared_instance(&self, key: InstanceKey, instance: PartInstance) {
        self.state
            .lock()
            .borrow_mut()
            .shared_instances
            .insert(key, instance);
    }

    /// Marks given instance as being constructed. Returns `false` if it already is.
    pub(crate) fn begin_construction(&self, key: &InstanceKey) -> bool {
        self.state
            .lock()
            .borrow_mut()
            .under_construction
            .insert(key.clone())
    }

    pub(crate) fn end_construction(&self, key: &InstanceKey) {
        self.state.lock().borrow_mut().under_construction.remove(key);
    }

    /// Registers an instance for disposal along with the scope. If the scope is already
    /// disposed, the instance is disposed right away.
    pub(crate) fn track_disposable(
        &self,
        instance: PartInstance,
        disposer: PartDisposer,
    ) -> Result<Arc<TrackedDisposable>, ExportProviderError> {
        let tracked = Arc::new(TrackedDisposable {
            instance,
            disposer,
            disposed: AtomicBool::new(false),
        });

        let guard = self.state.lock();
        if self.is_disposed() {
            drop(guard);
            tracked.dispose();
            return Err(ExportProviderError::ScopeDisposed);
        }

        guard.borrow_mut().disposables.push(tracked.clone());
        Ok(tracked)
    }

    /// Stops tracking given disposable, after it has been disposed by its sole owner.
    pub(crate) fn release_disposable(&self, tracked: &Arc<TrackedDisposable>) {
        self.state
            .lock()
            .borrow_mut()
            .disposables
            .retain(|disposable| !Arc::ptr_eq(disposable, tracked));
    }

    /// Disposes all child scopes and tracked instances. Waits for creation in progress on other
    /// threads. Subsequent calls do nothing.
    pub fn dispose(&self) {
        let children = {
            let guard = self.state.lock();
            if self.disposed.swap(true, Ordering::AcqRel) {
                return;
            }

            let mut state = guard.borrow_mut();
            mem::take(&mut state.children)
        };

        for child in &children {
            child.dispose();
        }

        let disposables = {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            state.shared_instances.clear();
            state.export_provider = None;
            mem::take(&mut state.disposables)
        };

        trace!(scope = self.id, disposables = disposables.len(), "Disposing sharing scope.");

        for disposable in disposables.iter().rev() {
            disposable.dispose();
        }

        if let Some(parent) = self.parent() {
            parent
                .state
                .lock()
                .borrow_mut()
                .children
                .retain(|child| child.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::contract::TypeRef;
    use crate::error::ExportProviderError;
    use crate::instance::{exported_value, PartInstance};
    use crate::part_definition::PartDisposer;
    use crate::runtime::PartSurrogate;
    use crate::scope::{InstanceKey, SharingScope, ROOT_SHARING_BOUNDARY};
    use std::sync::{Arc, Mutex};

    fn recording_disposer(log: Arc<Mutex<Vec<i32>>>) -> PartDisposer {
        Arc::new(move |instance: &PartInstance| {
            if let Some(value) = instance.downcast_ref::<i32>() {
                log.lock().unwrap().push(*value);
            }
        })
    }

    #[test]
    fn should_find_boundary_owners() {
        let root = SharingScope::root();
        let request = root.new_child(vec!["request".to_string()]).unwrap();
        let nested = request.new_child(vec!["nested".to_string()]).unwrap();

        assert_eq!(nested.owner_of("request").unwrap().id(), request.id());
        assert_eq!(nested.depth(), 2);
        assert_eq!(nested.parent().unwrap().id(), request.id());
        assert_eq!(
            nested.owner_of(ROOT_SHARING_BOUNDARY).unwrap().id(),
            root.id()
        );
        assert!(root.owner_of("request").is_none());
    }

    #[test]
    fn should_store_shared_instances() {
        let scope = SharingScope::root();
        let key = InstanceKey::new(PartSurrogate::new(0), vec![TypeRef::named("User")]);

        assert!(scope.shared_instance(&key).is_none());
        scope.store_shared_instance(key.clone(), exported_value(1_i32));
        assert!(scope.shared_instance(&key).is_some());
        assert!(scope
            .shared_instance(&InstanceKey::new(PartSurrogate::new(0), vec![]))
            .is_none());
    }

    #[test]
    fn should_track_construction() {
        let scope = SharingScope::root();
        let key = InstanceKey::new(PartSurrogate::new(3), vec![]);

        assert!(scope.begin_construction(&key));
        assert!(!scope.begin_construction(&key));
        scope.end_construction(&key);
        assert!(scope.begin_construction(&key));
    }

    #[test]
    fn should_dispose_children_first_and_once() {
        let log = Arc::new(Mutex::new(vec![]));
        let root = SharingScope::root();
        let child = root.new_child(vec!["request".to_string()]).unwrap();

        root.track_disposable(exported_value(1), recording_disposer(log.clone()))
            .unwrap();
        root.track_disposable(exported_value(2), recording_disposer(log.clone()))
            .unwrap();
        child
            .track_disposable(exported_value(3), recording_disposer(log.clone()))
            .unwrap();

        root.dispose();
        root.dispose();
        child.dispose();

        assert_eq!(*log.lock().unwrap(), vec![3, 2, 1]);
        assert!(child.is_disposed());
        assert!(matches!(
            root.new_child(vec![]).unwrap_err(),
            ExportProviderError::ScopeDisposed
        ));
    }

    #[test]
    fn should_not_dispose_released_instances_twice() {
        let log = Arc::new(Mutex::new(vec![]));
        let scope = SharingScope::root();

        let tracked = scope
            .track_disposable(exported_value(5), recording_disposer(log.clone()))
            .unwrap();
        tracked.dispose();
        scope.release_disposable(&tracked);
        scope.dispose();

        assert_eq!(*log.lock().unwrap(), vec![5]);
    }

    #[test]
    fn should_dispose_instances_tracked_after_disposal() {
        let log = Arc::new(Mutex::new(vec![]));
        let scope = SharingScope::root();
        scope.dispose();

        assert!(matches!(
            scope.track_disposable(exported_value(7), recording_disposer(log.clone())),
            Err(ExportProviderError::ScopeDisposed)
        ));
        assert_eq!(*log.lock().unwrap(), vec![7]);
        assert!(scope.lock_creation().is_err());
    }

    #[test]
    fn should_reuse_export_provider_value_while_held() {
        let scope = SharingScope::root();

        let first = scope.export_provider_value(|| exported_value(1_i32));
        let second = scope.export_provider_value(|| exported_value(2_i32));
        assert!(Arc::ptr_eq(&first, &second));

        drop(first);
        drop(second);

        let third = scope.export_provider_value(|| exported_value(3_i32));
        assert_eq!(third.downcast_ref::<i32>(), Some(&3));
    }
}
