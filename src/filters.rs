use crate::models::{SearchFilters, Station};
use std::collections::HashSet;

/// English country names the directory knows, mapped to ISO 3166-1 codes.
const COUNTRY_CODES: &[(&str, &str)] = &[
    ("Argentina", "AR"),
    ("Australia", "AU"),
    ("Austria", "AT"),
    ("Belgium", "BE"),
    ("Brazil", "BR"),
    ("Bulgaria", "BG"),
    ("Canada", "CA"),
    ("Chile", "CL"),
    ("China", "CN"),
    ("Colombia", "CO"),
    ("Croatia", "HR"),
    ("Czechia", "CZ"),
    ("Czech Republic", "CZ"),
    ("Denmark", "DK"),
    ("Egypt", "EG"),
    ("Finland", "FI"),
    ("France", "FR"),
    ("Germany", "DE"),
    ("Greece", "GR"),
    ("Hungary", "HU"),
    ("India", "IN"),
    ("Indonesia", "ID"),
    ("Ireland", "IE"),
    ("Israel", "IL"),
    ("Italy", "IT"),
    ("Japan", "JP"),
    ("Mexico", "MX"),
    ("Morocco", "MA"),
    ("Netherlands", "NL"),
    ("The Netherlands", "NL"),
    ("New Zealand", "NZ"),
    ("Norway", "NO"),
    ("Peru", "PE"),
    ("Philippines", "PH"),
    ("Poland", "PL"),
    ("Portugal", "PT"),
    ("Romania", "RO"),
    ("Russia", "RU"),
    ("The Russian Federation", "RU"),
    ("Saudi Arabia", "SA"),
    ("Serbia", "RS"),
    ("Singapore", "SG"),
    ("Slovakia", "SK"),
    ("Slovenia", "SI"),
    ("South Africa", "ZA"),
    ("South Korea", "KR"),
    ("Spain", "ES"),
    ("Sweden", "SE"),
    ("Switzerland", "CH"),
    ("Taiwan", "TW"),
    ("Thailand", "TH"),
    ("Turkey", "TR"),
    ("Ukraine", "UA"),
    ("United Arab Emirates", "AE"),
    ("United Kingdom", "GB"),
    ("The United Kingdom Of Great Britain And Northern Ireland", "GB"),
    ("United States", "US"),
    ("The United States Of America", "US"),
    ("USA", "US"),
    ("Venezuela", "VE"),
    ("Vietnam", "VN"),
];

/// Maps a country name to its code; unknown input is assumed to already be a code.
pub fn country_code(input: &str) -> String {
    let input = input.trim();
    COUNTRY_CODES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(input))
        .map(|(_, code)| code.to_string())
        .unwrap_or_else(|| input.to_uppercase())
}

/// Browse results: complete records only, one per name, nothing the user disliked.
pub fn sanitize_browse(stations: Vec<Station>, disliked: &[Station]) -> Vec<Station> {
    let mut seen_names: HashSet<String> = HashSet::new();
    stations
        .into_iter()
        .filter(|s| {
            if s.url.trim().is_empty() || s.name.trim().is_empty() || s.url_resolved.trim().is_empty() {
                return false;
            }
            let first = seen_names.insert(s.name.clone());
            first && !disliked.iter().any(|d| d.stationuuid == s.stationuuid)
        })
        .collect()
}

pub fn sanitize_search(stations: Vec<Station>) -> Vec<Station> {
    stations.into_iter().filter(Station::is_playable).collect()
}

impl SearchFilters {
    pub fn normalized(&self) -> SearchFilters {
        fn clean(v: &Option<String>) -> Option<String> {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }

        SearchFilters {
            name: clean(&self.name),
            country: clean(&self.country),
            language: clean(&self.language),
            genre: clean(&self.genre),
            bitrate: self.bitrate.filter(|b| *b > 0),
            codecs: self
                .codecs
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Query pairs for `/json/stations/search`, in the order the API documents them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let f = self.normalized();
        let mut pairs = vec![("limit", "100".to_string()), ("hidebroken", "true".to_string())];
        if let Some(name) = f.name {
            pairs.push(("name", name));
        }
        if let Some(country) = f.country {
            pairs.push(("countrycode", country_code(&country)));
        }
        if let Some(language) = f.language {
            pairs.push(("language", language.to_lowercase()));
        }
        if let Some(genre) = f.genre {
            pairs.push(("tag", genre.to_lowercase()));
        }
        if let Some(bitrate) = f.bitrate {
            pairs.push(("bitrateMin", bitrate.to_string()));
        }
        if !f.codecs.is_empty() {
            pairs.push(("codec", f.codecs.join(",")));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: &str, name: &str, url: &str, resolved: &str) -> Station {
        Station {
            stationuuid: id.into(),
            name: name.into(),
            url: url.into(),
            url_resolved: resolved.into(),
            ..Default::default()
        }
    }

    #[test]
    fn browse_drops_incomplete_duplicate_and_disliked() {
        let list = vec![
            station("1", "Alpha", "http://a", "http://a/r"),
            station("2", "Alpha", "http://a2", "http://a2/r"),
            station("3", "Beta", "http://b", ""),
            station("4", "", "http://c", "http://c/r"),
            station("5", "Gamma", "http://g", "http://g/r"),
            station("6", "Delta", "http://d", "http://d/r"),
        ];
        let disliked = vec![station("5", "Gamma", "", "")];
        let out = sanitize_browse(list, &disliked);
        let ids: Vec<&str> = out.iter().map(|s| s.stationuuid.as_str()).collect();
        assert_eq!(ids, vec!["1", "6"]);
    }

    #[test]
    fn search_keeps_any_stream_url() {
        let list = vec![
            station("1", "Raw only", "http://a", ""),
            station("2", "Resolved only", "", "http://b"),
            station("3", "Nothing", "", ""),
            station("4", "", "http://d", "http://d"),
        ];
        let ids: Vec<String> = sanitize_search(list).into_iter().map(|s| s.stationuuid).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn maps_country_names_case_insensitively() {
        assert_eq!(country_code("germany"), "DE");
        assert_eq!(country_code("  United Kingdom "), "GB");
        assert_eq!(country_code("at"), "AT");
        assert_eq!(country_code("Atlantis"), "ATLANTIS");
    }

    #[test]
    fn builds_filter_query() {
        let filters = SearchFilters {
            name: Some("  ".into()),
            country: Some(" Austria ".into()),
            language: Some("German".into()),
            genre: Some("Jazz".into()),
            bitrate: Some(128),
            codecs: vec!["MP3".into(), " ".into(), "AAC".into()],
        };
        let pairs = filters.query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("limit", "100".to_string()),
                ("hidebroken", "true".to_string()),
                ("countrycode", "AT".to_string()),
                ("language", "german".to_string()),
                ("tag", "jazz".to_string()),
                ("bitrateMin", "128".to_string()),
                ("codec", "MP3,AAC".to_string()),
            ]
        );
    }

    #[test]
    fn zero_bitrate_is_not_a_filter() {
        let filters = SearchFilters {
            bitrate: Some(0),
            ..Default::default()
        };
        assert!(filters.normalized().bitrate.is_none());
    }
}
