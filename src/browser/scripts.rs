//! JavaScript evaluated inside the platform page.

use serde_json::Value;
use std::collections::BTreeMap;

/// Global the web client's bundler registers its module chunks under.
pub const CHUNK_GLOBAL: &str = "webpackChunk_twitter_responsive_web";

/// Captures the web client's GraphQL dispatcher the next time it is invoked.
///
/// The client calls `dispatch` through `Function.prototype.apply` with the
/// client as `this`; the hook remembers that object and removes itself.
pub const INSTALL_DISPATCH_HOOK_JS: &str = r#"
(() => {
    if (globalThis.__harvest_client || globalThis.__harvest_hooked) return;
    globalThis.__harvest_hooked = true;
    const originalApply = Function.prototype.apply;
    Function.prototype.apply = function (thisArg, args) {
        if (thisArg && typeof thisArg === 'object' && thisArg.dispatch === this) {
            globalThis.__harvest_client = thisArg;
            Function.prototype.apply = originalApply;
        }
        return originalApply.call(this, thisArg, args);
    };
})()
"#;

/// Catches the client's init state as it is assigned during page load.
///
/// Must run before the page's own scripts, so it is registered for every new
/// document rather than evaluated after load.
pub const INIT_STATE_TRAP_JS: &str = r#"
(() => {
    if (Object.prototype.hasOwnProperty.call(globalThis, '__harvest_init_state')) return;
    globalThis.__harvest_init_state = undefined;
    Object.defineProperty(window, '__INITIAL_STATE__', {
        configurable: true,
        enumerable: true,
        get() {
            return globalThis.__harvest_init_state;
        },
        set(v) {
            globalThis.__harvest_init_state = v;
            Object.defineProperty(window, '__INITIAL_STATE__', {
                value: v,
                writable: true,
                enumerable: true,
                configurable: true,
            });
        },
    });
})()
"#;

/// Reads back the operation list, the feature switch tiers and dispatcher readiness.
const DISCOVER_JS: &str = r#"
(() => {
    const operations = (() => {
        const chunks = globalThis[__CHUNK_GLOBAL__];
        if (!Array.isArray(chunks)) return null;
        const found = [];
        for (const chunk of chunks) {
            const modules = chunk && chunk[1];
            if (!modules) continue;
            for (const id of Object.keys(modules)) {
                const factory = modules[id];
                if (typeof factory !== 'function') continue;
                const src = Function.prototype.toString.call(factory);
                if (!src.includes('queryId') || !src.includes('operationName')) continue;
                try {
                    const module = { exports: {} };
                    factory(module, module.exports, () => ({}));
                    const e = module.exports;
                    if (e && e.queryId && e.operationName) {
                        found.push({
                            operationName: e.operationName,
                            queryId: e.queryId,
                            operationType: e.operationType,
                            metadata: e.metadata || {},
                        });
                    }
                } catch (_) {}
            }
        }
        return found;
    })();
    const state = globalThis.__harvest_init_state || globalThis.__INITIAL_STATE__;
    return JSON.stringify({
        operations,
        initState: state && state.featureSwitch ? { featureSwitch: state.featureSwitch } : null,
        clientReady: !!globalThis.__harvest_client,
    });
})()
"#;

/// Starts one dispatcher call and parks its outcome in a numbered slot.
///
/// Slots nobody collected within the slot TTL are swept on the next dispatch;
/// a call that settles after its slot was swept is discarded.
const DISPATCH_JS: &str = r#"
(() => {
    const slots = (globalThis.__harvest_calls = globalThis.__harvest_calls || {});
    const started = (globalThis.__harvest_started = globalThis.__harvest_started || {});
    const now = Date.now();
    for (const key of Object.keys(started)) {
        if (now - started[key] > __TTL__) {
            delete started[key];
            delete slots[key];
        }
    }
    const id = __ID__;
    started[id] = now;
    const client = globalThis.__harvest_client;
    if (!client) {
        slots[id] = { ok: false, error: 'web client dispatcher not captured' };
        return;
    }
    slots[id] = null;
    const settle = (slot) => { if (id in started) slots[id] = slot; };
    Promise.resolve()
        .then(() => client.dispatch.apply(client, [__PAYLOAD__]))
        .then(
            (value) => settle({ ok: true, value }),
            (err) => settle({ ok: false, error: String((err && err.message) || err) })
        );
})()
"#;

/// Returns a settled slot as JSON (and frees it), or null while pending.
const POLL_JS: &str = r#"
(() => {
    const slots = globalThis.__harvest_calls || {};
    const slot = slots[__ID__];
    if (!slot) return null;
    delete slots[__ID__];
    if (globalThis.__harvest_started) delete globalThis.__harvest_started[__ID__];
    return JSON.stringify(slot);
})()
"#;

/// Writes captured web storage back into the current origin.
const RESTORE_STORAGE_JS: &str = r#"
(() => {
    const local = __LOCAL__;
    const session = __SESSION__;
    for (const [k, v] of Object.entries(local)) localStorage.setItem(k, v);
    for (const [k, v] of Object.entries(session)) sessionStorage.setItem(k, v);
})()
"#;

pub fn discover() -> String {
    DISCOVER_JS.replace("__CHUNK_GLOBAL__", &Value::from(CHUNK_GLOBAL).to_string())
}

pub fn dispatch(id: u64, slot_ttl_ms: u64, payload: &Value) -> String {
    DISPATCH_JS
        .replace("__ID__", &id.to_string())
        .replace("__TTL__", &slot_ttl_ms.to_string())
        .replace("__PAYLOAD__", &payload.to_string())
}

pub fn poll(id: u64) -> String {
    POLL_JS.replace("__ID__", &id.to_string())
}

pub fn restore_storage(
    local: &BTreeMap<String, String>,
    session: &BTreeMap<String, String>,
) -> String {
    RESTORE_STORAGE_JS
        .replace("__LOCAL__", &serde_json::json!(local).to_string())
        .replace("__SESSION__", &serde_json::json!(session).to_string())
}
