use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Language {
    #[default]
    En,
    De,
    Fr,
    Es,
    Zh,
    Ar,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::En,
        Language::De,
        Language::Fr,
        Language::Es,
        Language::Zh,
        Language::Ar,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::De => "de",
            Language::Fr => "fr",
            Language::Es => "es",
            Language::Zh => "zh",
            Language::Ar => "ar",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language: {0}")]
pub struct UnknownLanguage(String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept region-qualified codes such as "de-AT" or "zh_CN".
        let primary = s
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|l| l.code() == primary)
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

/// Unknown codes fall back to English instead of failing the whole config.
impl From<String> for Language {
    fn from(code: String) -> Self {
        code.parse().unwrap_or_else(|e: UnknownLanguage| {
            warn!(error = %e, "falling back to English");
            Language::default()
        })
    }
}

/// A user-facing message, translated when shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    FetchStationsFailed,
    FetchTopStationsFailed,
    NoSearchMatches,
    NoFilterMatches,
    NoStreamUrl,
    CannotPlay,
    CannotResume,
    PlaybackControlFailed,
    NoStationsAvailable,
    RegistrationSuccessful,
    RegistrationFailed,
    MissingFields,
    PasswordMismatch,
    LoginSuccessful,
    MissingCredentials,
    InvalidCredentials,
}

impl Notice {
    pub fn text(self, lang: Language) -> &'static str {
        use Language::*;
        use Notice::*;

        match (self, lang) {
            (FetchStationsFailed, En) => "Failed to fetch stations",
            (FetchStationsFailed, De) => "Sender konnten nicht geladen werden",
            (FetchStationsFailed, Fr) => "Impossible de récupérer les stations",
            (FetchStationsFailed, Es) => "No se pudieron obtener las emisoras",
            (FetchStationsFailed, Zh) => "获取电台失败",
            (FetchStationsFailed, Ar) => "فشل في جلب المحطات",

            (FetchTopStationsFailed, En) => "Failed to fetch top stations",
            (FetchTopStationsFailed, De) => "Top-Sender konnten nicht geladen werden",
            (FetchTopStationsFailed, Fr) => "Impossible de récupérer les meilleures stations",
            (FetchTopStationsFailed, Es) => "No se pudieron obtener las emisoras más votadas",
            (FetchTopStationsFailed, Zh) => "获取热门电台失败",
            (FetchTopStationsFailed, Ar) => "فشل في جلب المحطات الأعلى تصويتًا",

            (NoSearchMatches, En) => "No stations found matching your search",
            (NoSearchMatches, De) => "Keine Sender zu Ihrer Suche gefunden",
            (NoSearchMatches, Fr) => "Aucune station ne correspond à votre recherche",
            (NoSearchMatches, Es) => "No se encontraron emisoras para su búsqueda",
            (NoSearchMatches, Zh) => "未找到与搜索匹配的电台",
            (NoSearchMatches, Ar) => "لم يتم العثور على محطات تطابق بحثك",

            (NoFilterMatches, En) => "No stations found matching your filters",
            (NoFilterMatches, De) => "Keine Sender zu Ihren Filtern gefunden",
            (NoFilterMatches, Fr) => "Aucune station ne correspond à vos filtres",
            (NoFilterMatches, Es) => "No se encontraron emisoras con sus filtros",
            (NoFilterMatches, Zh) => "未找到与筛选条件匹配的电台",
            (NoFilterMatches, Ar) => "لم يتم العثور على محطات تطابق عوامل التصفية",

            (NoStreamUrl, En) => "No valid stream URL found",
            (NoStreamUrl, De) => "Keine gültige Stream-URL gefunden",
            (NoStreamUrl, Fr) => "Aucune URL de flux valide trouvée",
            (NoStreamUrl, Es) => "No se encontró una URL de transmisión válida",
            (NoStreamUrl, Zh) => "未找到有效的流地址",
            (NoStreamUrl, Ar) => "لم يتم العثور على رابط بث صالح",

            (CannotPlay, En) => "Cannot play this station. Please try another one.",
            (CannotPlay, De) => "Dieser Sender kann nicht abgespielt werden. Bitte versuchen Sie einen anderen.",
            (CannotPlay, Fr) => "Impossible de lire cette station. Veuillez en essayer une autre.",
            (CannotPlay, Es) => "No se puede reproducir esta emisora. Pruebe con otra.",
            (CannotPlay, Zh) => "无法播放此电台，请尝试其他电台。",
            (CannotPlay, Ar) => "لا يمكن تشغيل هذه المحطة. يرجى تجربة محطة أخرى.",

            (CannotResume, En) => "Cannot resume playback. Please try again.",
            (CannotResume, De) => "Wiedergabe kann nicht fortgesetzt werden. Bitte erneut versuchen.",
            (CannotResume, Fr) => "Impossible de reprendre la lecture. Veuillez réessayer.",
            (CannotResume, Es) => "No se puede reanudar la reproducción. Inténtelo de nuevo.",
            (CannotResume, Zh) => "无法恢复播放，请重试。",
            (CannotResume, Ar) => "لا يمكن استئناف التشغيل. يرجى المحاولة مرة أخرى.",

            (PlaybackControlFailed, En) => "Playback control failed",
            (PlaybackControlFailed, De) => "Wiedergabesteuerung fehlgeschlagen",
            (PlaybackControlFailed, Fr) => "Échec du contrôle de la lecture",
            (PlaybackControlFailed, Es) => "Error en el control de reproducción",
            (PlaybackControlFailed, Zh) => "播放控制失败",
            (PlaybackControlFailed, Ar) => "فشل التحكم في التشغيل",

            (NoStationsAvailable, En) => "No stations available",
            (NoStationsAvailable, De) => "Keine Sender verfügbar",
            (NoStationsAvailable, Fr) => "Aucune station disponible",
            (NoStationsAvailable, Es) => "No hay emisoras disponibles",
            (NoStationsAvailable, Zh) => "没有可用的电台",
            (NoStationsAvailable, Ar) => "لا توجد محطات متاحة",

            (RegistrationSuccessful, En) => "Registration successful!",
            (RegistrationSuccessful, De) => "Registrierung erfolgreich!",
            (RegistrationSuccessful, Fr) => "Inscription réussie !",
            (RegistrationSuccessful, Es) => "¡Registro completado!",
            (RegistrationSuccessful, Zh) => "注册成功！",
            (RegistrationSuccessful, Ar) => "تم التسجيل بنجاح!",

            (RegistrationFailed, En) => "Registration failed. Please try again.",
            (RegistrationFailed, De) => "Registrierung fehlgeschlagen. Bitte erneut versuchen.",
            (RegistrationFailed, Fr) => "L'inscription a échoué. Veuillez réessayer.",
            (RegistrationFailed, Es) => "El registro falló. Inténtelo de nuevo.",
            (RegistrationFailed, Zh) => "注册失败，请重试。",
            (RegistrationFailed, Ar) => "فشل التسجيل. يرجى المحاولة مرة أخرى.",

            (MissingFields, En) => "Please fill in all fields.",
            (MissingFields, De) => "Bitte füllen Sie alle Felder aus.",
            (MissingFields, Fr) => "Veuillez remplir tous les champs.",
            (MissingFields, Es) => "Por favor, complete todos los campos.",
            (MissingFields, Zh) => "请填写所有字段。",
            (MissingFields, Ar) => "يرجى ملء جميع الحقول.",

            (PasswordMismatch, En) => "Password doesn't match.",
            (PasswordMismatch, De) => "Passwörter stimmen nicht überein.",
            (PasswordMismatch, Fr) => "Les mots de passe ne correspondent pas.",
            (PasswordMismatch, Es) => "Las contraseñas no coinciden.",
            (PasswordMismatch, Zh) => "密码不匹配。",
            (PasswordMismatch, Ar) => "كلمة المرور غير متطابقة.",

            (LoginSuccessful, En) => "Login successful!",
            (LoginSuccessful, De) => "Anmeldung erfolgreich!",
            (LoginSuccessful, Fr) => "Connexion réussie !",
            (LoginSuccessful, Es) => "¡Inicio de sesión correcto!",
            (LoginSuccessful, Zh) => "登录成功！",
            (LoginSuccessful, Ar) => "تم تسجيل الدخول بنجاح!",

            (MissingCredentials, En) => "Please fill in both fields.",
            (MissingCredentials, De) => "Bitte füllen Sie beide Felder aus.",
            (MissingCredentials, Fr) => "Veuillez remplir les deux champs.",
            (MissingCredentials, Es) => "Por favor, complete ambos campos.",
            (MissingCredentials, Zh) => "请填写两个字段。",
            (MissingCredentials, Ar) => "يرجى ملء كلا الحقلين.",

            (InvalidCredentials, En) => "Invalid username or password.",
            (InvalidCredentials, De) => "Ungültiger Benutzername oder ungültiges Passwort.",
            (InvalidCredentials, Fr) => "Nom d'utilisateur ou mot de passe invalide.",
            (InvalidCredentials, Es) => "Usuario o contraseña no válidos.",
            (InvalidCredentials, Zh) => "用户名或密码无效。",
            (InvalidCredentials, Ar) => "اسم المستخدم أو كلمة المرور غير صحيحة.",
        }
    }
}
