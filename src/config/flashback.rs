//! Historical top players available through the flashback mutation.
//! Numbers are snapshots of the profile at the listed year.

pub struct FlashbackDef {
    pub user_id: &'static str,
    pub username: &'static str,
    pub rank: u32,
    pub pp: f64,
    pub accuracy: f64,
    pub play_count: u64,
    pub country: &'static str,
    pub level: f64,
    pub year: &'static str,
    pub multiplier: f64,
}

pub const FLASHBACK_TABLE: &[FlashbackDef] = &[
    FlashbackDef {
        user_id: "124493",
        username: "Cookiezi",
        rank: 1,
        pp: 13_500.0,
        accuracy: 98.9,
        play_count: 26_000,
        country: "KR",
        level: 101.2,
        year: "2016",
        multiplier: 3.0,
    },
    FlashbackDef {
        user_id: "39828",
        username: "WubWoofWolf",
        rank: 1,
        pp: 8_400.0,
        accuracy: 98.6,
        play_count: 90_000,
        country: "PL",
        level: 102.5,
        year: "2013",
        multiplier: 2.5,
    },
    FlashbackDef {
        user_id: "1777162",
        username: "hvick225",
        rank: 2,
        pp: 11_900.0,
        accuracy: 99.1,
        play_count: 40_000,
        country: "TW",
        level: 100.7,
        year: "2015",
        multiplier: 2.2,
    },
    FlashbackDef {
        user_id: "2558286",
        username: "Rafis",
        rank: 1,
        pp: 12_800.0,
        accuracy: 98.2,
        play_count: 150_000,
        country: "PL",
        level: 104.0,
        year: "2017",
        multiplier: 2.4,
    },
    FlashbackDef {
        user_id: "4650315",
        username: "idke",
        rank: 3,
        pp: 14_300.0,
        accuracy: 98.7,
        play_count: 70_000,
        country: "US",
        level: 102.1,
        year: "2018",
        multiplier: 2.0,
    },
];
