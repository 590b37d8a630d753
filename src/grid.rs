use std::fmt::Display;
use std::ops::{Index, IndexMut};

/// Byte RGB image, indexed by (x, y).
pub type Bitmap = Grid2<[u8; 3]>;

/// Byte grayscale image, indexed by (x, y).
pub type GrayImage = Grid2<u8>;

/// Saturates to [0, 255] and truncates. NaN maps to 0.
pub fn bound_to_byte(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    OutOfBounds {
        index: Vec<usize>,
        dims: Vec<usize>,
    },
    InvalidDataLength {
        expected: usize,
        got: usize,
    },
}

impl std::error::Error for GridError {}

impl Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::OutOfBounds { index, dims } => {
                write!(f, "Index {:?} out of bounds for grid {:?}", index, dims)
            }
            GridError::InvalidDataLength { expected, got } => {
                write!(f, "Invalid data length: expected {}, got {}", expected, got)
            }
        }
    }
}

/// Dense 2D grid addressed as (x, y). Storage is row-major: x varies fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid2<T> {
    dim_x: usize,
    dim_y: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> Grid2<T> {
    pub fn new(dim_x: usize, dim_y: usize) -> Self {
        Self::filled(dim_x, dim_y, T::default())
    }
}

impl<T: Clone> Grid2<T> {
    pub fn filled(dim_x: usize, dim_y: usize, value: T) -> Self {
        Self {
            dim_x,
            dim_y,
            data: vec![value; dim_x * dim_y],
        }
    }
}

impl<T> Grid2<T> {
    pub fn from_fn(dim_x: usize, dim_y: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(dim_x * dim_y);
        for y in 0..dim_y {
            for x in 0..dim_x {
                data.push(f(x, y));
            }
        }
        Self { dim_x, dim_y, data }
    }

    pub fn from_vec(dim_x: usize, dim_y: usize, data: Vec<T>) -> Result<Self, GridError> {
        if data.len() != dim_x * dim_y {
            return Err(GridError::InvalidDataLength {
                expected: dim_x * dim_y,
                got: data.len(),
            });
        }
        Ok(Self { dim_x, dim_y, data })
    }

    pub fn dim_x(&self) -> usize {
        self.dim_x
    }

    pub fn dim_y(&self) -> usize {
        self.dim_y
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.dim_x, self.dim_y)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    fn offset(&self, x: usize, y: usize) -> Option<usize> {
        if x < self.dim_x && y < self.dim_y {
            Some(y * self.dim_x + x)
        } else {
            None
        }
    }

    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        self.offset(x, y).and_then(|i| self.data.get(i))
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut T> {
        let i = self.offset(x, y)?;
        self.data.get_mut(i)
    }

    /// Iterates every element together with its (x, y) position.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, &T)> + '_ {
        let dim_x = self.dim_x;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, v)| (i % dim_x, i / dim_x, v))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.data.iter()
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Grid2<U> {
        Grid2 {
            dim_x: self.dim_x,
            dim_y: self.dim_y,
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Copies `src` into this grid with its origin at (x0, y0). Out-of-range
    /// source pixels are dropped.
    pub fn blit(&mut self, src: &Grid2<T>, x0: usize, y0: usize)
    where
        T: Clone,
    {
        for (x, y, v) in src.cells() {
            if let Some(dst) = self.get_mut(x + x0, y + y0) {
                *dst = v.clone();
            }
        }
    }
}

impl<T> Index<(usize, usize)> for Grid2<T> {
    type Output = T;

    fn index(&self, (x, y): (usize, usize)) -> &T {
        match self.offset(x, y) {
            Some(i) => &self.data[i],
            None => panic!("grid index ({}, {}) out of bounds for {:?}", x, y, self.dims()),
        }
    }
}

impl<T> IndexMut<(usize, usize)> for Grid2<T> {
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut T {
        match self.offset(x, y) {
            Some(i) => &mut self.data[i],
            None => panic!("grid index ({}, {}) out of bounds for {:?}", x, y, self.dims()),
        }
    }
}

/// Dense 3D grid addressed as (channel, x, y).
#[derive(Debug, Clone, PartialEq)]
pub struct Grid3<T> {
    dim_c: usize,
    dim_x: usize,
    dim_y: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> Grid3<T> {
    pub fn new(dim_c: usize, dim_x: usize, dim_y: usize) -> Self {
        Self {
            dim_c,
            dim_x,
            dim_y,
            data: vec![T::default(); dim_c * dim_x * dim_y],
        }
    }
}

impl<T> Grid3<T> {
    pub fn from_fn(
        dim_c: usize,
        dim_x: usize,
        dim_y: usize,
        mut f: impl FnMut(usize, usize, usize) -> T,
    ) -> Self {
        let mut data = Vec::with_capacity(dim_c * dim_x * dim_y);
        for c in 0..dim_c {
            for y in 0..dim_y {
                for x in 0..dim_x {
                    data.push(f(c, x, y));
                }
            }
        }
        Self {
            dim_c,
            dim_x,
            dim_y,
            data,
        }
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.dim_c, self.dim_x, self.dim_y)
    }

    pub fn dim_c(&self) -> usize {
        self.dim_c
    }

    pub fn dim_x(&self) -> usize {
        self.dim_x
    }

    pub fn dim_y(&self) -> usize {
        self.dim_y
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    fn offset(&self, c: usize, x: usize, y: usize) -> Option<usize> {
        if c < self.dim_c && x < self.dim_x && y < self.dim_y {
            Some((c * self.dim_y + y) * self.dim_x + x)
        } else {
            None
        }
    }

    pub fn get(&self, c: usize, x: usize, y: usize) -> Option<&T> {
        self.offset(c, x, y).and_then(|i| self.data.get(i))
    }

    pub fn get_mut(&mut self, c: usize, x: usize, y: usize) -> Option<&mut T> {
        let i = self.offset(c, x, y)?;
        self.data.get_mut(i)
    }

    pub fn try_get_mut(&mut self, c: usize, x: usize, y: usize) -> Result<&mut T, GridError> {
        let dims = vec![self.dim_c, self.dim_x, self.dim_y];
        self.get_mut(c, x, y).ok_or(GridError::OutOfBounds {
            index: vec![c, x, y],
            dims,
        })
    }

    /// Iterates every element together with its (channel, x, y) position.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, usize, &T)> + '_ {
        let (dim_x, dim_y) = (self.dim_x, self.dim_y);
        self.data.iter().enumerate().map(move |(i, v)| {
            let plane = dim_x * dim_y;
            (i / plane, i % dim_x, (i % plane) / dim_x, v)
        })
    }
}

impl<T> Index<(usize, usize, usize)> for Grid3<T> {
    type Output = T;

    fn index(&self, (c, x, y): (usize, usize, usize)) -> &T {
        match self.offset(c, x, y) {
            Some(i) => &self.data[i],
            None => panic!(
                "grid index ({}, {}, {}) out of bounds for {:?}",
                c,
                x,
                y,
                self.dims()
            ),
        }
    }
}

impl<T> IndexMut<(usize, usize, usize)> for Grid3<T> {
    fn index_mut(&mut self, (c, x, y): (usize, usize, usize)) -> &mut T {
        match self.offset(c, x, y) {
            Some(i) => &mut self.data[i],
            None => panic!(
                "grid index ({}, {}, {}) out of bounds for {:?}",
                c,
                x,
                y,
                self.dims()
            ),
        }
    }
}
