use super::constructor::DepInfo;
use crate::error::{ArmatureError, Result};
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) type ScopeId = usize;

/// The scope public provides land in; ancestor of every module scope.
pub(crate) const ROOT_SCOPE: ScopeId = 0;

type AnyValue = Arc<dyn Any + Send + Sync>;
type CtorFn = Arc<dyn Fn(&mut ResolveCx<'_>) -> Result<AnyValue> + Send + Sync>;
type DecorateFn = Arc<dyn Fn(AnyValue, &mut ResolveCx<'_>) -> Result<AnyValue> + Send + Sync>;

/// Type-erased invocation, ready to run against the container.
pub(crate) type InvokeCall = Arc<dyn Fn(&mut ResolveCx<'_>) -> Result<()> + Send + Sync>;

/// A type-erased constructor registration produced by the typed option layer.
pub(crate) struct ProvideRegistration {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub constructor: String,
    pub registered_at: &'static Location<'static>,
    pub deps: Vec<DepInfo>,
    pub is_supply: bool,
    pub ctor: CtorFn,
}

/// A type-erased decorator registration.
pub(crate) struct DecorateRegistration {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub decorator: String,
    pub registered_at: &'static Location<'static>,
    pub deps: Vec<DepInfo>,
    pub func: DecorateFn,
}

struct Entry {
    scope: ScopeId,
    private: bool,
    type_name: &'static str,
    constructor: String,
    registered_at: &'static Location<'static>,
    deps: Vec<DepInfo>,
    is_supply: bool,
    ctor: CtorFn,
}

struct DecoratorEntry {
    scope: ScopeId,
    decorator: String,
    registered_at: &'static Location<'static>,
    deps: Vec<DepInfo>,
    func: DecorateFn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum InstanceKey {
    Base(TypeId, ScopeId),
    /// Keyed by the nearest decorating scope; every requester seeing the
    /// same decorator chain shares the instance.
    Decorated(TypeId, ScopeId),
}

/// Flattened view of a provider, for graph rendering.
pub(crate) struct ProviderSnapshot {
    pub type_name: &'static str,
    pub constructor: String,
    pub is_supply: bool,
    pub deps: Vec<DepInfo>,
}

/// Thread-safe dependency-injection container.
///
/// Values are singletons: a constructor runs at most once per decorator
/// chain, and everyone receives the same `Arc<T>`. Cycle verification is
/// deferred to resolution, where the resolution stack exposes the cycle path.
pub struct Container {
    providers: DashMap<TypeId, Vec<Arc<Entry>>>,
    decorators: DashMap<TypeId, Vec<Arc<DecoratorEntry>>>,
    instances: DashMap<InstanceKey, AnyValue>,
    /// Parent link per scope; index 0 is the root.
    scopes: Mutex<Vec<Option<ScopeId>>>,
    dry_run: bool,
    recover_from_panics: bool,
    frozen: AtomicBool,
}

impl Container {
    pub(crate) fn new(dry_run: bool, recover_from_panics: bool) -> Self {
        Self {
            providers: DashMap::new(),
            decorators: DashMap::new(),
            instances: DashMap::new(),
            scopes: Mutex::new(vec![None]),
            dry_run,
            recover_from_panics,
            frozen: AtomicBool::new(false),
        }
    }

    pub(crate) fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Create a scope nested under `parent`. Private provides registered in
    /// a scope are visible only to it and its descendants.
    pub(crate) fn child_scope(&self, parent: ScopeId) -> ScopeId {
        let mut scopes = self.lock_scopes();
        scopes.push(Some(parent));
        scopes.len() - 1
    }

    /// No further provides or decorates are accepted after this.
    pub(crate) fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub(crate) fn provide(
        &self,
        scope: ScopeId,
        private: bool,
        reg: ProvideRegistration,
    ) -> Result<()> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(ArmatureError::Frozen);
        }

        let mut entries = self.providers.entry(reg.type_id).or_default();
        if let Some(existing) = entries
            .iter()
            .find(|e| self.conflicts(e.scope, e.private, scope, private))
        {
            return Err(ArmatureError::DuplicateProvide {
                type_name: reg.type_name,
                existing: format!("{} ({})", existing.constructor, existing.registered_at),
            });
        }
        entries.push(Arc::new(Entry {
            scope,
            private,
            type_name: reg.type_name,
            constructor: reg.constructor,
            registered_at: reg.registered_at,
            deps: reg.deps,
            is_supply: reg.is_supply,
            ctor: reg.ctor,
        }));
        Ok(())
    }

    pub(crate) fn decorate(&self, scope: ScopeId, reg: DecorateRegistration) -> Result<()> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(ArmatureError::Frozen);
        }
        self.decorators
            .entry(reg.type_id)
            .or_default()
            .push(Arc::new(DecoratorEntry {
                scope,
                decorator: reg.decorator,
                registered_at: reg.registered_at,
                deps: reg.deps,
                func: reg.func,
            }));
        Ok(())
    }

    /// Run (or, in dry-run mode, only validate) an invocation.
    pub(crate) fn invoke(
        &self,
        scope: ScopeId,
        function: &str,
        registered_at: &'static Location<'static>,
        deps: &[DepInfo],
        call: &InvokeCall,
    ) -> Result<()> {
        if self.dry_run {
            let mut stack = Vec::new();
            return self.check_deps(deps, scope, function, &mut stack);
        }
        let mut cx = ResolveCx::new(self, scope, function);
        let call = call.clone();
        self.call_guarded(function, registered_at, move || call(&mut cx))
    }

    /// Resolve a single value from `scope`; entry point for the logger
    /// bootstrap.
    pub(crate) fn resolve_value<T: Send + Sync + 'static>(
        &self,
        scope: ScopeId,
        requester: &str,
    ) -> Result<Arc<T>> {
        let mut cx = ResolveCx::new(self, scope, requester);
        cx.resolve::<T>()
    }

    /// Validate that every dependency in `deps` is transitively resolvable
    /// from `scope` without executing any constructor.
    pub(crate) fn check_deps(
        &self,
        deps: &[DepInfo],
        scope: ScopeId,
        requester: &str,
        stack: &mut Vec<DepInfo>,
    ) -> Result<()> {
        for dep in deps {
            if stack.iter().any(|d| d.type_id == dep.type_id) {
                return Err(cycle_error(stack, dep.type_name));
            }
            let entry = self.find_visible(dep.type_id, scope).ok_or_else(|| {
                ArmatureError::MissingDependency {
                    type_name: dep.type_name,
                    requester: requester.to_string(),
                }
            })?;
            stack.push(*dep);
            self.check_deps(&entry.deps, entry.scope, &entry.constructor, stack)?;
            stack.pop();
        }
        Ok(())
    }

    fn resolve_raw(
        &self,
        type_id: TypeId,
        type_name: &'static str,
        cx: &mut ResolveCx<'_>,
    ) -> Result<AnyValue> {
        if cx.stack.iter().any(|d| d.type_id == type_id) {
            return Err(cycle_error(&cx.stack, type_name));
        }

        let entry = self.find_visible(type_id, cx.scope).ok_or_else(|| {
            ArmatureError::MissingDependency {
                type_name,
                requester: cx.requester.clone(),
            }
        })?;

        let decorating_scope = self.decoration_scope(type_id, cx.scope);
        let key = match decorating_scope {
            Some(scope) => InstanceKey::Decorated(type_id, scope),
            None => InstanceKey::Base(type_id, entry.scope),
        };
        if let Some(hit) = self.instances.get(&key) {
            return Ok(hit.clone());
        }

        let base_key = InstanceKey::Base(type_id, entry.scope);
        let base = match self.instances.get(&base_key).map(|v| v.clone()) {
            Some(value) => value,
            None => {
                cx.stack.push(DepInfo { type_id, type_name });
                let value = self.construct(&entry, cx);
                cx.stack.pop();
                let value = value?;
                self.instances.insert(base_key, value.clone());
                value
            }
        };

        let Some(decorating_scope) = decorating_scope else {
            return Ok(base);
        };

        let mut value = base;
        for decorator in self.decorators_on_path(type_id, decorating_scope) {
            cx.stack.push(DepInfo { type_id, type_name });
            let saved_scope = std::mem::replace(&mut cx.scope, decorator.scope);
            let saved_requester =
                std::mem::replace(&mut cx.requester, decorator.decorator.clone());
            let func = decorator.func.clone();
            let current = value;
            let cx_ref = &mut *cx;
            let decorated = self.call_guarded(
                &decorator.decorator,
                decorator.registered_at,
                move || func(current, cx_ref),
            );
            cx.scope = saved_scope;
            cx.requester = saved_requester;
            cx.stack.pop();
            value = decorated?;
        }
        self.instances.insert(key, value.clone());
        Ok(value)
    }

    fn construct(&self, entry: &Arc<Entry>, cx: &mut ResolveCx<'_>) -> Result<AnyValue> {
        let saved_scope = std::mem::replace(&mut cx.scope, entry.scope);
        let saved_requester = std::mem::replace(&mut cx.requester, entry.constructor.clone());
        let ctor = entry.ctor.clone();
        let cx_ref = &mut *cx;
        let result =
            self.call_guarded(&entry.constructor, entry.registered_at, move || ctor(cx_ref));
        cx.scope = saved_scope;
        cx.requester = saved_requester;
        result
    }

    fn call_guarded<R>(
        &self,
        function: &str,
        registered_at: &'static Location<'static>,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        if !self.recover_from_panics {
            return f();
        }
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(payload) => {
                eprintln!("DEBUG inline downcast: {:?}", payload.downcast_ref::<&str>());
                let msg = panic_message(&payload);
                eprintln!("DEBUG computed message: {:?}", msg);
                Err(ArmatureError::Panicked {
                function: function.to_string(),
                message: msg,
                registered_at: registered_at.to_string(),
            })},
        }
    }

    fn find_visible(&self, type_id: TypeId, scope: ScopeId) -> Option<Arc<Entry>> {
        let entries = self.providers.get(&type_id)?;
        entries
            .iter()
            .find(|e| !e.private || self.is_within(scope, e.scope))
            .cloned()
    }

    /// The nearest ancestor-or-self of `scope` that decorates `type_id`.
    fn decoration_scope(&self, type_id: TypeId, scope: ScopeId) -> Option<ScopeId> {
        let decorators = self.decorators.get(&type_id)?;
        let mut current = Some(scope);
        while let Some(scope) = current {
            if decorators.iter().any(|d| d.scope == scope) {
                return Some(scope);
            }
            current = self.parent_of(scope);
        }
        None
    }

    /// All decorators for `type_id` on the root-to-`scope` path, outermost
    /// scope first, registration order within a scope.
    fn decorators_on_path(&self, type_id: TypeId, scope: ScopeId) -> Vec<Arc<DecoratorEntry>> {
        let Some(decorators) = self.decorators.get(&type_id) else {
            return Vec::new();
        };
        let mut path = Vec::new();
        let mut current = Some(scope);
        while let Some(scope) = current {
            path.push(scope);
            current = self.parent_of(scope);
        }
        path.reverse();
        path.iter()
            .flat_map(|scope| {
                decorators
                    .iter()
                    .filter(|d| d.scope == *scope)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn conflicts(&self, s1: ScopeId, private1: bool, s2: ScopeId, private2: bool) -> bool {
        if !private1 || !private2 {
            return true;
        }
        self.is_within(s1, s2) || self.is_within(s2, s1)
    }

    fn is_within(&self, scope: ScopeId, ancestor: ScopeId) -> bool {
        let mut current = Some(scope);
        while let Some(scope) = current {
            if scope == ancestor {
                return true;
            }
            current = self.parent_of(scope);
        }
        false
    }

    fn parent_of(&self, scope: ScopeId) -> Option<ScopeId> {
        self.lock_scopes().get(scope).copied().flatten()
    }

    fn lock_scopes(&self) -> std::sync::MutexGuard<'_, Vec<Option<ScopeId>>> {
        self.scopes.lock().expect("container scopes poisoned")
    }

    pub(crate) fn snapshot(&self) -> Vec<ProviderSnapshot> {
        let mut snapshots: Vec<ProviderSnapshot> = self
            .providers
            .iter()
            .flat_map(|entries| {
                entries
                    .value()
                    .iter()
                    .map(|e| ProviderSnapshot {
                        type_name: e.type_name,
                        constructor: e.constructor.clone(),
                        is_supply: e.is_supply,
                        deps: e.deps.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        snapshots.sort_by(|a, b| a.type_name.cmp(b.type_name));
        snapshots
    }
}

/// State threaded through one resolution: the requesting scope, the chain of
/// constructors currently executing (for cycle reporting), and the name of
/// whoever asked (for missing-dependency reporting).
pub struct ResolveCx<'a> {
    container: &'a Container,
    scope: ScopeId,
    requester: String,
    stack: Vec<DepInfo>,
}

impl<'a> ResolveCx<'a> {
    pub(crate) fn new(container: &'a Container, scope: ScopeId, requester: &str) -> Self {
        Self {
            container,
            scope,
            requester: requester.to_string(),
            stack: Vec::new(),
        }
    }

    pub(crate) fn container(&self) -> &'a Container {
        self.container
    }

    /// Resolve `Arc<T>`, constructing it (and its dependencies) on first use.
    pub fn resolve<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        let container = self.container;
        let value = container.resolve_raw(TypeId::of::<T>(), std::any::type_name::<T>(), self)?;
        value
            .downcast::<T>()
            .map_err(|_| ArmatureError::MissingDependency {
                type_name: std::any::type_name::<T>(),
                requester: self.requester.clone(),
            })
    }
}

fn cycle_error(stack: &[DepInfo], repeated: &'static str) -> ArmatureError {
    let mut path: Vec<&str> = stack.iter().map(|d| d.type_name).collect();
    path.push(repeated);
    ArmatureError::DependencyCycle {
        path: path.join(" -> "),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic".to_string()
    }
}
