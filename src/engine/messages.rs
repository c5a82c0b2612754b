//! Localized messages
//!
//! Small static catalog for the texts the engine writes into settings or
//! returns to the host. Unknown locales fall back to English.

use crate::settings::{keys, ProvisioningSettings};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOCALE: &str = "en";

/// Identifier of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    /// {0} = action, {1} = reason
    ActionFailed,
    /// {0} = state
    UnknownState,
    /// {0} = outcome, {1} = state
    UnmodeledOutcome,
    /// {0} = state
    MissingHandler,
    /// {0} = resource reason, {1} = attempt
    WaitingForResources,
    /// {0} = instance
    InProgress,
    /// {0} = instance
    Finished,
    /// {0} = instance
    Deleted,
    /// {0} = instance
    ManualStepPending,
    /// {0} = instance
    ScriptRunning,
}

struct Entry {
    key: MessageKey,
    en: &'static str,
    de: &'static str,
    ja: &'static str,
}

const CATALOG: &[Entry] = &[
    Entry {
        key: MessageKey::ActionFailed,
        en: "Action {0} failed: {1}",
        de: "Aktion {0} fehlgeschlagen: {1}",
        ja: "アクション {0} が失敗しました: {1}",
    },
    Entry {
        key: MessageKey::UnknownState,
        en: "Unknown provisioning state: {0}",
        de: "Unbekannter Bereitstellungsstatus: {0}",
        ja: "不明なプロビジョニング状態: {0}",
    },
    Entry {
        key: MessageKey::UnmodeledOutcome,
        en: "Outcome {0} is not modeled in state {1}",
        de: "Ergebnis {0} ist im Status {1} nicht vorgesehen",
        ja: "状態 {1} では結果 {0} は想定されていません",
    },
    Entry {
        key: MessageKey::MissingHandler,
        en: "No action is registered for state {0}",
        de: "Für den Status {0} ist keine Aktion registriert",
        ja: "状態 {0} にはアクションが登録されていません",
    },
    Entry {
        key: MessageKey::WaitingForResources,
        en: "Waiting for resources ({0}), attempt {1}",
        de: "Warte auf Ressourcen ({0}), Versuch {1}",
        ja: "リソースを待機しています ({0})、試行 {1}",
    },
    Entry {
        key: MessageKey::InProgress,
        en: "Provisioning of {0} is in progress",
        de: "Bereitstellung von {0} läuft",
        ja: "{0} のプロビジョニングを実行中です",
    },
    Entry {
        key: MessageKey::Finished,
        en: "{0} is ready",
        de: "{0} ist bereit",
        ja: "{0} の準備ができました",
    },
    Entry {
        key: MessageKey::Deleted,
        en: "{0} has been removed",
        de: "{0} wurde entfernt",
        ja: "{0} は削除されました",
    },
    Entry {
        key: MessageKey::ManualStepPending,
        en: "{0} is waiting for a manual step by the operator",
        de: "{0} wartet auf einen manuellen Schritt des Betreibers",
        ja: "{0} はオペレーターの手動作業を待っています",
    },
    Entry {
        key: MessageKey::ScriptRunning,
        en: "A configuration script is running in {0}",
        de: "In {0} läuft ein Konfigurationsskript",
        ja: "{0} で構成スクリプトを実行中です",
    },
];

/// A message in one locale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub locale: String,
    pub text: String,
}

/// Render a catalog entry, substituting `{0}`, `{1}`, ...
pub fn render(locale: &str, key: MessageKey, args: &[&str]) -> LocalizedText {
    let locale = normalize(locale);
    let template = CATALOG
        .iter()
        .find(|e| e.key == key)
        .map(|e| match locale {
            "de" => e.de,
            "ja" => e.ja,
            _ => e.en,
        })
        .unwrap_or("");

    let mut text = template.to_string();
    for (i, arg) in args.iter().enumerate() {
        text = text.replace(&format!("{{{}}}", i), arg);
    }

    LocalizedText {
        locale: locale.to_string(),
        text,
    }
}

/// Locale requested in the settings, or the default
pub fn locale_of(settings: &ProvisioningSettings) -> &str {
    settings.get_non_empty(keys::LOCALE).unwrap_or(DEFAULT_LOCALE)
}

fn normalize(locale: &str) -> &'static str {
    let language = locale.split(['-', '_']).next().unwrap_or_default();
    match language.to_ascii_lowercase().as_str() {
        "de" => "de",
        "ja" => "ja",
        _ => DEFAULT_LOCALE,
    }
}
