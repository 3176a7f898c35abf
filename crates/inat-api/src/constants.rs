use std::collections::HashMap;
use std::time::Duration;

use response_cache::Expiration;

// --- Base URLs ---

/// REST API (Rails endpoints, OAuth)
pub const API_V0: &str = "https://www.inaturalist.org";
/// JSON API v1
pub const API_V1: &str = "https://api.inaturalist.org/v1";
/// JSON API v2 (provisional)
pub const API_V2: &str = "https://api.inaturalist.org/v2";

pub const EXPORT_URL: &str = "https://www.inaturalist.org/observations/export";
pub const PHOTO_BASE_URL: &str = "https://static.inaturalist.org/photos";
pub const PHOTO_CC_BASE_URL: &str = "https://inaturalist-open-data.s3.amazonaws.com/photos";
pub const PHOTO_INFO_BASE_URL: &str = "https://www.inaturalist.org/photos";
pub const ICONIC_TAXA_BASE_URL: &str =
    "https://raw.githubusercontent.com/inaturalist/inaturalist/main/app/assets/images/iconic_taxa";

// --- Credentials ---

/// Service name for credential store entries
pub const CREDENTIAL_SERVICE: &str = "/inaturalist";

/// Access tokens are refreshed after this long
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

// --- Pagination ---

/// Default page size for paginated queries
pub const PER_PAGE_RESULTS: u64 = 200;

/// Autocomplete endpoints return at most this many results
pub const AUTOCOMPLETE_PER_PAGE: u64 = 20;

/// Most IDs one multi-ID request resolves; longer lists are split into batches
pub const IDS_PER_REQUEST: usize = 30;

/// Queries returning more results than this log a warning
pub const LARGE_REQUEST_WARNING: u64 = 5000;

// --- Rate limiting, retries and timeouts ---

pub const REQUESTS_PER_SECOND: f64 = 1.0;
pub const REQUESTS_PER_MINUTE: f64 = 60.0;
pub const REQUESTS_PER_DAY: f64 = 10_000.0;
pub const REQUEST_BURST_RATE: u32 = 1;
pub const MAX_DELAY: Duration = Duration::from_secs(60);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
pub const REQUEST_RETRIES: u32 = 5;
pub const RETRY_BACKOFF: f64 = 0.5;

/// Statuses retried with backoff
pub const RETRY_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Refreshing a resource past the CDN cache needs a fresh `v` value this often
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(122);

/// Maximum upload size for photos
pub const MAX_FILESIZE: usize = 20_000_000;

// --- Storage ---

pub const DATA_DIR_NAME: &str = "inaturalist";
pub const CACHE_DIR_NAME: &str = "api_cache";
pub const RATELIMIT_FILE_NAME: &str = "api_ratelimit.json";

/// Built-in cache expiration patterns, checked after any configured by the caller
pub fn default_cache_patterns() -> Vec<(String, Expiration)> {
    vec![
        ("api.inaturalist.org/*autocomplete".to_string(), Expiration::days(30)),
        ("api.inaturalist.org/v*/controlled_terms*".to_string(), Expiration::days(7)),
        ("api.inaturalist.org/v*/places*".to_string(), Expiration::days(7)),
        ("api.inaturalist.org/v*/taxa*".to_string(), Expiration::days(7)),
        ("www.inaturalist.org/users/api_token".to_string(), Expiration::days(1)),
        (format!("{PHOTO_CC_BASE_URL}/*"), Expiration::Never),
        (format!("{PHOTO_BASE_URL}/*"), Expiration::Never),
        (format!("{ICONIC_TAXA_BASE_URL}/*"), Expiration::Never),
    ]
}

/// Expiration for URLs no pattern matches
pub const DEFAULT_CACHE_EXPIRATION: Expiration = Expiration::minutes(30);

// --- Taxonomy ---

/// Ranks that can be filtered on, from lowest to highest
pub const RANKS: &[&str] = &[
    "infrahybrid",
    "form",
    "variety",
    "subspecies",
    "hybrid",
    "species",
    "complex",
    "subsection",
    "section",
    "subgenus",
    "genushybrid",
    "genus",
    "subtribe",
    "tribe",
    "supertribe",
    "subfamily",
    "family",
    "epifamily",
    "superfamily",
    "zoosubsection",
    "zoosection",
    "parvorder",
    "infraorder",
    "suborder",
    "order",
    "superorder",
    "subterclass",
    "infraclass",
    "subclass",
    "class",
    "superclass",
    "subphylum",
    "phylum",
    "kingdom",
];

// --- Multiple-choice values ---

pub const CC_LICENSES: &[&str] = &[
    "CC-BY",
    "CC-BY-NC",
    "CC-BY-ND",
    "CC-BY-SA",
    "CC-BY-NC-ND",
    "CC-BY-NC-SA",
    "CC0",
];
pub const COMMUNITY_ID_STATUSES: &[&str] = &["most_agree", "most_disagree", "some_agree"];
pub const CONSERVATION_STATUSES: &[&str] = &["LC", "NT", "VU", "EN", "CR", "EW", "EX"];
pub const EXTRA_PROPERTIES: &[&str] = &["fields", "identifications", "projects"];
pub const GEOPRIVACY_LEVELS: &[&str] = &["obscured", "obscured_private", "open", "private"];
pub const HAS_PROPERTIES: &[&str] = &["photo", "geo"];
pub const HISTOGRAM_DATE_FIELDS: &[&str] = &["created", "observed"];
pub const HISTOGRAM_INTERVALS: &[&str] = &[
    "year",
    "month",
    "week",
    "day",
    "hour",
    "month_of_year",
    "week_of_year",
];
pub const ID_CATEGORIES: &[&str] = &["improving", "supporting", "leading", "maverick"];
pub const INBOXES: &[&str] = &["inbox", "sent", "any"];
pub const ORDER_DIRECTIONS: &[&str] = &["asc", "desc"];
pub const PHOTO_SIZES: &[&str] = &["square", "small", "medium", "large", "original"];
pub const PROJECT_TYPES: &[&str] = &["assessment", "bioblitz", "collection", "umbrella"];
pub const QUALITY_GRADES: &[&str] = &["casual", "needs_id", "research"];
pub const SEARCH_PROPERTIES: &[&str] = &["names", "tags", "description", "place"];
pub const SOURCES: &[&str] = &["places", "projects", "taxa", "users"];

// Endpoint-specific `order_by` values
pub const V0_OBS_ORDER_BY_PROPERTIES: &[&str] = &["date_added", "observed_on"];
pub const V1_OBS_ORDER_BY_PROPERTIES: &[&str] =
    &["created_at", "id", "observed_on", "species_guess", "votes"];
pub const V2_OBS_ORDER_BY_PROPERTIES: &[&str] = &[
    "created_at",
    "id",
    "observed_on",
    "species_guess",
    "updated_at",
    "votes",
    "random",
];
pub const PROJECT_ORDER_BY_PROPERTIES: &[&str] =
    &["created", "distance", "featured", "recent_posts", "updated"];

/// Parameters holding taxonomic ranks
pub const RANK_PARAMS: &[&str] = &[
    "rank",
    "lrank",
    "hrank",
    "min_rank",
    "max_rank",
    "observation_rank",
    "observation_lrank",
    "observation_hrank",
];

/// Parameters that take a date or datetime
pub const DATETIME_PARAMS: &[&str] = &[
    "created_after",
    "created_d1",
    "created_d2",
    "created_on",
    "d1",
    "d2",
    "newer_than",
    "observation_created_d1",
    "observation_created_d2",
    "observed_d1",
    "observed_d2",
    "observed_on",
    "observed_on_string",
    "older_than",
    "on",
    "prefers_rule_d1",
    "prefers_rule_d2",
    "since",
    "updated_since",
];

lazy_static::lazy_static! {
    /// Iconic taxon IDs and names
    pub static ref ICONIC_TAXA: HashMap<u64, &'static str> = HashMap::from([
        (0, "Unknown"),
        (1, "Animalia"),
        (3, "Aves"),
        (20978, "Amphibia"),
        (26036, "Reptilia"),
        (40151, "Mammalia"),
        (47178, "Actinopterygii"),
        (47115, "Mollusca"),
        (47119, "Arachnida"),
        (47158, "Insecta"),
        (47126, "Plantae"),
        (47170, "Fungi"),
        (48222, "Chromista"),
        (47686, "Protozoa"),
    ]);

    /// Aliases accepted for ranks
    pub static ref RANK_EQUIVALENTS: HashMap<&'static str, &'static str> = HashMap::from([
        ("division", "phylum"),
        ("gen", "genus"),
        ("sp", "species"),
        ("spp", "species"),
        ("infraspecies", "subspecies"),
        ("ssp", "subspecies"),
        ("subsp", "subspecies"),
        ("trinomial", "subspecies"),
        ("var", "variety"),
    ]);

    static ref ICONIC_TAXON_NAMES: Vec<&'static str> = {
        let mut names: Vec<_> = ICONIC_TAXA.iter().map(|(id, name)| (*id, *name)).collect();
        names.sort_unstable();
        names.into_iter().map(|(_, name)| name).collect()
    };

    /// Multiple-choice parameters shared by all endpoints, with their accepted values
    pub static ref MULTIPLE_CHOICE_PARAMS: Vec<(&'static str, &'static [&'static str])> = vec![
        ("box", INBOXES),
        ("category", ID_CATEGORIES),
        ("csi", CONSERVATION_STATUSES),
        ("date_field", HISTOGRAM_DATE_FIELDS),
        ("extra", EXTRA_PROPERTIES),
        ("geoprivacy", GEOPRIVACY_LEVELS),
        ("has", HAS_PROPERTIES),
        ("hrank", RANKS),
        ("iconic_taxa", ICONIC_TAXON_NAMES.as_slice()),
        ("identifications", COMMUNITY_ID_STATUSES),
        ("interval", HISTOGRAM_INTERVALS),
        ("license", CC_LICENSES),
        ("lrank", RANKS),
        ("max_rank", RANKS),
        ("min_rank", RANKS),
        ("observation_hrank", RANKS),
        ("observation_lrank", RANKS),
        ("observation_rank", RANKS),
        ("order", ORDER_DIRECTIONS),
        ("photo_license", CC_LICENSES),
        ("quality_grade", QUALITY_GRADES),
        ("rank", RANKS),
        ("search_on", SEARCH_PROPERTIES),
        ("sound_license", CC_LICENSES),
        ("sources", SOURCES),
        ("taxon_geoprivacy", GEOPRIVACY_LEVELS),
        ("type", PROJECT_TYPES),
    ];
}

/// Name of an iconic taxon, or `"Unknown"`
pub fn iconic_taxon_name(id: u64) -> &'static str {
    ICONIC_TAXA.get(&id).copied().unwrap_or("Unknown")
}
