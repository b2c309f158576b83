use geo::{Coord, MapCoords};

/// Mean earth radius (IUGG) in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Spherical azimuthal equidistant projection centred on a single coordinate.
///
/// Distances and azimuths measured from the centre are true, which is what the
/// radius and bearing based shapes in NOTAMs are defined by. Planar units are
/// metres, `x` pointing east and `y` pointing north.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalProjection {
    center: Coord,
    sin_lat0: f64,
    cos_lat0: f64,
}

impl LocalProjection {
    pub fn new(center: Coord) -> Self {
        let (sin_lat0, cos_lat0) = center.y.to_radians().sin_cos();
        Self {
            center,
            sin_lat0,
            cos_lat0,
        }
    }

    pub fn center(&self) -> Coord {
        self.center
    }

    pub fn forward(&self, coord: Coord) -> Coord {
        let delta_lng = (coord.x - self.center.x).to_radians();
        let (sin_lat, cos_lat) = coord.y.to_radians().sin_cos();
        let (sin_dlng, cos_dlng) = delta_lng.sin_cos();

        let east = cos_lat * sin_dlng;
        let north = self.cos_lat0 * sin_lat - self.sin_lat0 * cos_lat * cos_dlng;
        let cos_c = self.sin_lat0 * sin_lat + self.cos_lat0 * cos_lat * cos_dlng;
        let sin_c = east.hypot(north);
        if sin_c < f64::EPSILON {
            return Coord { x: 0.0, y: 0.0 };
        }

        let scale = EARTH_RADIUS_M * sin_c.atan2(cos_c) / sin_c;
        Coord {
            x: scale * east,
            y: scale * north,
        }
    }

    pub fn inverse(&self, coord: Coord) -> Coord {
        let rho = coord.x.hypot(coord.y);
        if rho < f64::EPSILON {
            return self.center;
        }

        let (sin_c, cos_c) = (rho / EARTH_RADIUS_M).sin_cos();
        let lat = (cos_c * self.sin_lat0 + coord.y * sin_c * self.cos_lat0 / rho)
            .clamp(-1.0, 1.0)
            .asin();
        let delta_lng = (coord.x * sin_c)
            .atan2(rho * self.cos_lat0 * cos_c - coord.y * self.sin_lat0 * sin_c);

        Coord {
            x: normalize_longitude(self.center.x + delta_lng.to_degrees()),
            y: lat.to_degrees(),
        }
    }

    pub fn project<G>(&self, geometry: &G) -> G
    where
        G: MapCoords<f64, f64, Output = G>,
    {
        let projection = *self;
        geometry.map_coords(move |coord| projection.forward(coord))
    }

    pub fn unproject<G>(&self, geometry: &G) -> G
    where
        G: MapCoords<f64, f64, Output = G>,
    {
        let projection = *self;
        geometry.map_coords(move |coord| projection.inverse(coord))
    }
}

fn normalize_longitude(lng: f64) -> f64 {
    if (-180.0..=180.0).contains(&lng) {
        lng
    } else {
        (lng + 180.0).rem_euclid(360.0) - 180.0
    }
}

pub fn make_local_projection(lng: f64, lat: f64) -> LocalProjection {
    LocalProjection::new(Coord { x: lng, y: lat })
}

pub fn project<G>(geometry: &G, center: Coord) -> G
where
    G: MapCoords<f64, f64, Output = G>,
{
    LocalProjection::new(center).project(geometry)
}

pub fn unproject<G>(geometry: &G, center: Coord) -> G
where
    G: MapCoords<f64, f64, Output = G>,
{
    LocalProjection::new(center).unproject(geometry)
}
