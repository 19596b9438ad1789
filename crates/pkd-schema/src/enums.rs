//! Enumerated protocol vocabulary and its fixed text forms.
//!
//! Helpers and clients exchange these values as lowercase, hyphenated text.
//! Every enum serializes as that text.

use std::fmt;

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The text form used on the wire.
            pub fn as_text(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Resolve a wire text, returning `None` for unknown values.
            pub fn from_text(text: &str) -> Option<Self> {
                match text {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_text())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_text())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = <String as serde::Deserialize>::deserialize(deserializer)?;
                Self::from_text(&text).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "unknown {} '{text}'",
                        stringify!($name)
                    ))
                })
            }
        }
    };
}

text_enum!(
    /// Classification attached to every `package` line.
    InfoKind {
        Installed => "installed",
        Available => "available",
        Low => "low",
        Normal => "normal",
        Important => "important",
        Security => "security",
        Bugfix => "bugfix",
        Enhancement => "enhancement",
        Blocked => "blocked",
        Downloading => "downloading",
        Updating => "updating",
        Installing => "installing",
        Removing => "removing",
        Cleanup => "cleanup",
        Obsoleting => "obsoleting",
    }
);

text_enum!(
    /// What has to be restarted after an update is applied.
    RestartKind {
        None => "none",
        Application => "application",
        Session => "session",
        System => "system",
    }
);

text_enum!(
    /// Package group. Unlike the other kinds, unknown group text is tolerated
    /// and maps to [`GroupKind::Unknown`].
    GroupKind {
        Accessibility => "accessibility",
        Accessories => "accessories",
        Education => "education",
        Games => "games",
        Graphics => "graphics",
        Internet => "internet",
        Office => "office",
        Other => "other",
        Programming => "programming",
        Multimedia => "multimedia",
        System => "system",
        DesktopGnome => "desktop-gnome",
        DesktopKde => "desktop-kde",
        DesktopXfce => "desktop-xfce",
        DesktopOther => "desktop-other",
        Publishing => "publishing",
        Server => "server",
        Fonts => "fonts",
        AdminTools => "admin-tools",
        Legacy => "legacy",
        Localization => "localization",
        Virtualization => "virtualization",
        Unknown => "unknown",
    }
);

text_enum!(
    /// Error codes a helper (or the supervisor) can attach to a transaction.
    ErrorKind {
        Oom => "oom",
        NoNetwork => "no-network",
        NotSupported => "not-supported",
        InternalError => "internal-error",
        GpgFailure => "gpg-failure",
        PackageIdInvalid => "package-id-invalid",
        PackageNotInstalled => "package-not-installed",
        PackageAlreadyInstalled => "package-already-installed",
        PackageDownloadFailed => "package-download-failed",
        InstallFailed => "install-failed",
        GroupNotFound => "group-not-found",
        DepResolutionFailed => "dep-resolution-failed",
        FilterInvalid => "filter-invalid",
        CreateThreadFailed => "create-thread-failed",
        TransactionError => "transaction-error",
        NoCache => "no-cache",
        RepoNotFound => "repo-not-found",
        CannotRemoveSystemPackage => "cannot-remove-system-package",
        ProcessQuit => "process-quit",
        ProcessKill => "process-kill",
        FailedInitialization => "failed-initialization",
        FailedFinalise => "failed-finalise",
        FailedConfigParsing => "failed-config-parsing",
        CannotCancel => "cannot-cancel",
    }
);

text_enum!(
    /// Severity of a free-text message shown to the user.
    MessageKind {
        Notice => "notice",
        Warning => "warning",
        /// Emitted by the daemon itself, never by a helper's intent.
        Daemon => "daemon",
    }
);

text_enum!(
    /// Coarse phase a helper reports while it works.
    StatusKind {
        Setup => "setup",
        Wait => "wait",
        Running => "running",
        Query => "query",
        Info => "info",
        Remove => "remove",
        RefreshCache => "refresh-cache",
        Download => "download",
        Install => "install",
        Update => "update",
        Cleanup => "cleanup",
        Obsolete => "obsolete",
        DepResolve => "dep-resolve",
        Rollback => "rollback",
        Commit => "commit",
        Request => "request",
        Finished => "finished",
        Cancel => "cancel",
    }
);

text_enum!(
    /// Operation class of a transaction.
    Role {
        Cancel => "cancel",
        Resolve => "resolve",
        Rollback => "rollback",
        GetDepends => "get-depends",
        GetUpdateDetail => "get-update-detail",
        GetDescription => "get-description",
        GetFiles => "get-files",
        GetRequires => "get-requires",
        GetUpdates => "get-updates",
        SearchDetails => "search-details",
        SearchFile => "search-file",
        SearchGroup => "search-group",
        SearchName => "search-name",
        RefreshCache => "refresh-cache",
        UpdateSystem => "update-system",
        RemovePackage => "remove-package",
        InstallPackage => "install-package",
        InstallFile => "install-file",
        UpdatePackage => "update-package",
        GetRepoList => "get-repo-list",
        RepoEnable => "repo-enable",
        RepoSetData => "repo-set-data",
    }
);

text_enum!(
    /// How a helper process ended.
    ExitKind {
        Success => "success",
        Failed => "failed",
        Killed => "kill",
        Quit => "quit",
    }
);

impl ExitKind {
    pub fn is_success(self) -> bool {
        self == ExitKind::Success
    }
}
