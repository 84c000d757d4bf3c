//! User settings as subscribable values.

use std::rc::Rc;

use avbus_core::{Handler, HandlerSubscription, MutableSubscribable, Subject, Subscribable};

use crate::value::{SettingValue, UserSettingDefinition};

type ChangeCallback = Box<dyn Fn(&SettingValue)>;

struct Inner {
    definition: UserSettingDefinition,
    value: Subject<SettingValue>,
    on_local_change: ChangeCallback,
}

/// A setting value owned by a settings manager.
///
/// Local writes through [`UserSetting::set`] are reported to the manager so
/// it can publish them; [`UserSetting::sync_value`] applies a value received
/// from elsewhere without reporting it back. Clones share the same value.
#[derive(Clone)]
pub struct UserSetting {
    inner: Rc<Inner>,
}

impl UserSetting {
    pub(crate) fn new(
        definition: UserSettingDefinition,
        on_local_change: impl Fn(&SettingValue) + 'static,
    ) -> Self {
        let value = Subject::create(definition.default_value.clone());
        Self {
            inner: Rc::new(Inner {
                definition,
                value,
                on_local_change: Box::new(on_local_change),
            }),
        }
    }

    pub fn definition(&self) -> &UserSettingDefinition {
        &self.inner.definition
    }

    pub fn name(&self) -> &str {
        &self.inner.definition.name
    }

    pub fn value(&self) -> SettingValue {
        self.inner.value.get()
    }

    /// Set the value locally. Equal values are ignored.
    pub fn set(&self, value: SettingValue) {
        if self.inner.value.get() == value {
            return;
        }
        self.inner.value.set(value.clone());
        (self.inner.on_local_change)(&value);
    }

    /// Adopt a value without reporting it as a local change
    pub fn sync_value(&self, value: SettingValue) {
        self.inner.value.set(value);
    }

    /// Restore the definition's default value as a local change
    pub fn reset_to_default(&self) {
        self.set(self.inner.definition.default_value.clone());
    }

    /// Whether two handles refer to the same setting
    pub fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Subscribable<SettingValue> for UserSetting {
    fn get(&self) -> SettingValue {
        self.value()
    }

    fn sub_handler(
        &self,
        handler: &Handler<SettingValue>,
        initial_notify: bool,
        paused: bool,
    ) -> HandlerSubscription<SettingValue> {
        self.inner.value.sub_handler(handler, initial_notify, paused)
    }

    fn unsub(&self, handler: &Handler<SettingValue>) {
        self.inner.value.unsub(handler);
    }
}

impl MutableSubscribable<SettingValue> for UserSetting {
    fn set(&self, value: SettingValue) {
        UserSetting::set(self, value);
    }
}

impl std::fmt::Debug for UserSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSetting")
            .field("name", &self.name())
            .field("value", &self.value())
            .finish()
    }
}
